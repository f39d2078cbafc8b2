//! # tilemm gemm
//!
//! Dense matrix multiplication bound to the fastest kernels the running CPU
//! supports.
//!
//! A [`Dispatcher`] detects the CPU once and fills one kernel table per
//! element type, applying the generic, architecture and micro-architecture
//! stages in that order. Each operation validates its operands, then picks
//! the outer-product tile kernel when the problem is tile-aligned and large
//! enough, or the vector kernel otherwise.
//!
//! ## Example
//!
//! ```rust
//! let a = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
//! let b = [7.0f32, 8.0, 9.0, 10.0, 11.0, 12.0];
//! let mut c = [0.0f32; 4];
//! tilemm_gemm::matmul(&a, &b, &mut c, 2, 2, 3);
//! assert_eq!(c, [58.0, 64.0, 139.0, 154.0]);
//! ```

pub mod api;
mod core;
mod saf;

pub use saf::*;
