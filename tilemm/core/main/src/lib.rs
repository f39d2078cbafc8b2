//! # tilemm core
//!
//! Shared building blocks for the tilemm GEMM engine.
//!
//! ## Features
//!
//! - [`Element`] abstraction over `f32` / `f64` with per-type tile widths
//! - [`SimdVector`] primitive layer (AVX2+FMA, NEON, portable lanes)
//! - One-shot CPU capability probing ([`capabilities`])
//! - [`RuntimeConfig`] with environment overrides and global thresholds
//! - Element-keyed scratch [`BufferPool`]s and the [`StreamingSession`] guard
//!
//! ## Example
//!
//! ```rust
//! use tilemm_core::{MatRef, RuntimeConfig};
//!
//! let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
//! let a = MatRef::new(&data, 2, 3).unwrap();
//! assert_eq!(a.row(1), &[4.0, 5.0, 6.0]);
//! assert_eq!(RuntimeConfig::default().block_size, 48);
//! ```

pub mod api;
mod core;
mod saf;

pub use saf::*;
