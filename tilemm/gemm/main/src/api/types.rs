//! Kernel signatures and the dispatch table layout

use std::ops::Range;

use tilemm_core::{Capabilities, Element, SimdLevel, WriteMode};

/// One GEMM problem in raw-pointer form: `C (op)= A x B` with
/// `C` of `m x n`, `A` of `m x k` and `B` of `k x n`.
///
/// Operand layouts are given by strides, so the same call describes a
/// row-major `A` (`a_rs = k, a_cs = 1`), a pre-transposed `A`
/// (`a_rs = 1, a_cs = m`), a row-major `B` (`b_rs = n, b_cs = 1`) or a
/// K-last `B` stored `n x k` (`b_rs = 1, b_cs = k`).
#[derive(Debug, Clone, Copy)]
pub struct GemmCall<T> {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub a: *const T,
    /// Step between rows of `A`.
    pub a_rs: usize,
    /// Step along the reduction axis of `A`.
    pub a_cs: usize,
    pub b: *const T,
    /// Step along the reduction axis of `B`.
    pub b_rs: usize,
    /// Step between columns of `B`.
    pub b_cs: usize,
    pub c: *mut T,
    pub ldc: usize,
    pub mode: WriteMode,
}

// Pointers are only dereferenced inside kernels, over regions the caller
// has proven disjoint per call.
unsafe impl<T: Send> Send for GemmCall<T> {}
unsafe impl<T: Send> Sync for GemmCall<T> {}

impl<T> GemmCall<T> {
    /// Row-major `A (m x k)`, row-major `B (k x n)`, contiguous `C`.
    pub fn row_major(
        a: *const T,
        b: *const T,
        c: *mut T,
        m: usize,
        n: usize,
        k: usize,
        mode: WriteMode,
    ) -> Self {
        Self { m, n, k, a, a_rs: k, a_cs: 1, b, b_rs: n, b_cs: 1, c, ldc: n, mode }
    }

    /// `A` supplied as its `k x lda` transpose (`lda >= m`).
    #[allow(clippy::too_many_arguments)]
    pub fn transposed_lhs(
        at: *const T,
        lda: usize,
        b: *const T,
        ldb: usize,
        c: *mut T,
        ldc: usize,
        dims: (usize, usize, usize),
        mode: WriteMode,
    ) -> Self {
        let (m, n, k) = dims;
        Self { m, n, k, a: at, a_rs: 1, a_cs: lda, b, b_rs: ldb, b_cs: 1, c, ldc, mode }
    }

    /// Row-major `A (m x k)`, `B` stored as `n x k`.
    pub fn k_last(
        a: *const T,
        b: *const T,
        c: *mut T,
        m: usize,
        n: usize,
        k: usize,
        mode: WriteMode,
    ) -> Self {
        Self { m, n, k, a, a_rs: k, a_cs: 1, b, b_rs: 1, b_cs: k, c, ldc: n, mode }
    }

    /// The sub-problem producing rows `rows` and columns `cols` of `C`.
    ///
    /// # Safety
    ///
    /// The ranges must lie inside `0..m` and `0..n`.
    pub unsafe fn sub(&self, rows: Range<usize>, cols: Range<usize>) -> Self {
        debug_assert!(rows.end <= self.m && cols.end <= self.n);
        Self {
            m: rows.len(),
            n: cols.len(),
            a: self.a.add(rows.start * self.a_rs),
            b: self.b.add(cols.start * self.b_cs),
            c: self.c.add(rows.start * self.ldc + cols.start),
            ..*self
        }
    }
}

/// `C (op)= A x B` for the layouts a kernel accepts.
pub type GemmFn<T> = unsafe fn(&GemmCall<T>);

/// Cache-blocked GEMM; the second argument is the block edge.
pub type BlockedFn<T> = unsafe fn(&GemmCall<T>, usize);

/// Transpose rows `range` of a row-major `rows x cols` source into the
/// matching columns of a `cols x rows` destination.
pub type TransposeFn<T> = unsafe fn(*const T, *mut T, usize, usize, Range<usize>);

/// Dispatch stages, applied in [`STAGE_ORDER`]; a later stage overwrites
/// whatever an earlier one bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Scalar reference and portable lane-array kernels.
    Generic,
    /// Architecture vector kernels (AVX2+FMA, NEON).
    Arch,
    /// Outer-product tile kernels and tile-staged transpose.
    MicroArch,
}

pub const STAGE_ORDER: [Stage; 3] = [Stage::Generic, Stage::Arch, Stage::MicroArch];

impl Stage {
    /// Whether the running CPU supports this stage.
    pub fn applies(&self, caps: &Capabilities) -> bool {
        match self {
            Stage::Generic => true,
            Stage::Arch => caps.simd_level() != SimdLevel::Portable,
            Stage::MicroArch => caps.has_tile_unit(),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Generic => write!(f, "generic"),
            Stage::Arch => write!(f, "arch"),
            Stage::MicroArch => write!(f, "micro-arch"),
        }
    }
}

/// A bound kernel with the name and stage it came from.
#[derive(Clone, Copy)]
pub struct KernelEntry<F> {
    pub name: &'static str,
    pub stage: Option<Stage>,
    pub func: F,
}

impl<F> KernelEntry<F> {
    /// An entry outside the stage sequence (the scalar baseline).
    pub const fn baseline(name: &'static str, func: F) -> Self {
        Self { name, stage: None, func }
    }

    pub const fn staged(stage: Stage, name: &'static str, func: F) -> Self {
        Self { name, stage: Some(stage), func }
    }
}

impl<F> std::fmt::Debug for KernelEntry<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} ({})", self.name, stage),
            None => write!(f, "{} (baseline)", self.name),
        }
    }
}

/// Outer-product kernels; guarded by tile alignment and minimum size.
#[derive(Debug, Clone, Copy)]
pub struct TileKernels<T> {
    /// Requires `a_rs == 1`, `b_cs == 1` and `m`, `n` multiples of the tile.
    pub gemm: KernelEntry<GemmFn<T>>,
    /// Requires `a_rs == 1` and `b_cs == 1`; edges route to vector kernels.
    pub blocked: KernelEntry<BlockedFn<T>>,
}

/// Per-element-type kernel table.
#[derive(Debug, Clone, Copy)]
pub struct KernelTable<T> {
    /// Requires `b_cs == 1`; any `A` strides.
    pub matmul: KernelEntry<GemmFn<T>>,
    /// Requires `a_cs == 1` and `b_rs == 1`.
    pub matmul_klast: KernelEntry<GemmFn<T>>,
    /// Requires `b_cs == 1`; any `A` strides.
    pub blocked: KernelEntry<BlockedFn<T>>,
    pub transpose: KernelEntry<TransposeFn<T>>,
    pub tile: Option<TileKernels<T>>,
}

/// An element type with a full set of GEMM kernels.
pub trait GemmElement: Element {
    /// Kernels used when everything but the scalar path is disabled.
    fn scalar_table() -> KernelTable<Self>;

    /// Overwrite `table` entries with this stage's kernels. Returns whether
    /// any entry was installed for this target.
    fn bind_stage(stage: Stage, caps: &Capabilities, table: &mut KernelTable<Self>) -> bool;

    /// This type's table inside a dispatcher.
    fn table(dispatcher: &crate::Dispatcher) -> &KernelTable<Self>;
}
