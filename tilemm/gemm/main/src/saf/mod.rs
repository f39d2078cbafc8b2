//! Facade re-exports for tilemm-gemm

pub use crate::api::types::*;
pub use crate::core::dispatch::{dispatcher, Dispatcher};
pub use crate::core::ops::{matmul, matmul_blocked, matmul_klast, transpose, transpose_rows};
pub use crate::core::parallel::{parallel_batched_matmul, parallel_matmul, parallel_transpose};
pub use crate::core::transpose::{HUGE_TRANSPOSE, SMALL_TRANSPOSE, STAGE};
pub use crate::core::widen::{matmul_bf16, matmul_f16};
