//! Facade re-exports for tilemm-quant

pub use crate::api::error::*;
pub use crate::api::types::*;
pub use crate::core::activation::{erf, gelu, gelu_approx, relu, sigmoid, silu};
pub use crate::core::dequant::{dequantize, nibble, NF4_TABLE};
pub use crate::core::fused::{
    fused_matmul, fused_swiglu, parallel_fused_matmul, FusedKernels, FusedMatmul, FUSED_TILE_COLS,
};
pub use crate::core::quantize::{quantize, quantize_int4, quantize_int8, quantize_nf4};
