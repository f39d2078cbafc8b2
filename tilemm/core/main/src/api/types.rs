//! Core types shared by every tilemm kernel

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Mul};

use crate::core::arena::{BufferPool, F32_POOL, F64_POOL};

/// Numeric element a GEMM kernel can operate on.
///
/// Accumulation always happens in the element's own precision; there is no
/// implicit upcast.
pub trait Element:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + Debug
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Mul<Output = Self>
    + AddAssign
{
    const ZERO: Self;
    const ONE: Self;

    /// Native outer-product tile width for this precision.
    const TILE: usize;

    /// Short type name used in kernel names and log lines.
    const NAME: &'static str;

    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;

    /// Scratch pool for this element type.
    fn pool() -> &'static BufferPool<Self>;
}

impl Element for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const TILE: usize = 16;
    const NAME: &'static str = "f32";

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn pool() -> &'static BufferPool<Self> {
        &F32_POOL
    }
}

impl Element for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const TILE: usize = 8;
    const NAME: &'static str = "f64";

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    fn pool() -> &'static BufferPool<Self> {
        &F64_POOL
    }
}

/// How a kernel writes its result into the output matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// `C = A x B`
    #[default]
    Overwrite,
    /// `C += A x B`
    Accumulate,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Overwrite => write!(f, "overwrite"),
            WriteMode::Accumulate => write!(f, "accumulate"),
        }
    }
}
