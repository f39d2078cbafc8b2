//! # tilemm quant
//!
//! Fused dequantize + matmul + activation over 4-bit and 8-bit weights.
//!
//! ## Features
//!
//! - NF4, Int4 and Int8 packed layouts with per-`(k, group)` f32 scales
//! - Absmax quantizers ([`quantize_int4`], [`quantize_int8`], [`quantize_nf4`])
//! - [`fused_matmul`] with Identity, SiLU, GELU, approximate GELU and ReLU
//! - [`fused_swiglu`] over two independently quantized projections
//! - [`parallel_fused_matmul`] spreading output column tiles over a worker pool
//!
//! ## Example
//!
//! ```rust
//! use tilemm_quant::{fused_matmul, Activation, QuantScheme, QuantizedWeights};
//!
//! // One byte, two Int4 codes: low nibble 0 -> -8, high nibble 15 -> 7.
//! let packed = [0xF0u8];
//! let scales = [1.0f32];
//! let w = QuantizedWeights::new(QuantScheme::Int4, &packed, &scales, 1, 2, 2).unwrap();
//!
//! let mut out = [0.0f32; 2];
//! fused_matmul(&[1.0], &w, &mut out, 1, Activation::Identity);
//! assert_eq!(out, [-8.0, 7.0]);
//! ```

pub mod api;
mod core;
mod saf;

pub use saf::*;
