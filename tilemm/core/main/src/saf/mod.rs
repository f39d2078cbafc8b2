//! Facade re-exports for tilemm-core

pub use crate::api::error::*;
pub use crate::api::types::*;
pub use crate::core::arena::{BufferPool, PooledBuffer};
pub use crate::core::capabilities::{capabilities, Capabilities, SimdLevel};
pub use crate::core::config::{
    block_size, force_scalar, max_parallelism, parallel_threshold, tile_min_dim, OptProfile,
    RuntimeConfig,
};
pub use crate::core::matrix::{require_len, DisjointMut, MatMut, MatRef};
pub use crate::core::simd::{Portable, SimdVector};
pub use crate::core::streaming::StreamingSession;

#[cfg(target_arch = "x86_64")]
pub use crate::core::simd::x86::{F32x8, F64x4};

#[cfg(target_arch = "aarch64")]
pub use crate::core::simd::arm::{F32x4, F64x2};
