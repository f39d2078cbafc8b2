//! Validated entry points over the dispatch table.
//!
//! Every operation checks operand lengths against the declared dimensions
//! and panics on a short buffer before any kernel runs.

use std::ops::Range;
use std::time::Instant;

use tilemm_core::{block_size, require_len, tile_min_dim, Element, MatMut, MatRef, WriteMode};

use crate::api::types::{GemmCall, GemmElement};
use crate::core::dispatch::{dispatcher, Dispatcher};

#[track_caller]
pub(crate) fn elems(rows: usize, cols: usize) -> usize {
    rows.checked_mul(cols)
        .unwrap_or_else(|| panic!("{}x{} overflows usize", rows, cols))
}

/// Elements a `rows x cols` view with row stride `ld` spans.
#[track_caller]
fn strided_elems(rows: usize, cols: usize, ld: usize) -> usize {
    assert!(ld >= cols, "row stride {} shorter than row length {}", ld, cols);
    match rows {
        0 => 0,
        _ => elems(rows - 1, ld) + cols,
    }
}

/// Views over the operands of an `m x k` by `k x n` product.
#[track_caller]
pub(crate) fn gemm_operands<'a, T>(
    a: &'a [T],
    b: &'a [T],
    c: &'a mut [T],
    (m, n, k): (usize, usize, usize),
) -> (MatRef<'a, T>, MatRef<'a, T>, MatMut<'a, T>) {
    (
        MatRef::operand("lhs", a, m, k),
        MatRef::operand("rhs", b, k, n),
        MatMut::operand("out", c, m, n),
    )
}

fn perf_start() -> Option<Instant> {
    if log::log_enabled!(log::Level::Trace) {
        Some(Instant::now())
    } else {
        None
    }
}

fn perf_end<T: Element>(
    start: Option<Instant>,
    op: &str,
    kernel: &str,
    m: usize,
    n: usize,
    k: usize,
) {
    if let Some(t) = start {
        log::trace!(
            "[perf] gemm::{}<{}> [{}x{}]x[{}x{}] via {} {:.3}ms",
            op,
            T::NAME,
            m,
            k,
            k,
            n,
            kernel,
            t.elapsed().as_secs_f64() * 1000.0
        );
    }
}

impl Dispatcher {
    /// Tile guard: `m` and `n` are multiples of the tile width, all three
    /// dimensions reach `tile_min_dim`, and tile kernels are bound.
    pub fn tile_eligible<T: GemmElement>(&self, m: usize, n: usize, k: usize) -> bool {
        self.table::<T>().tile.is_some()
            && m % T::TILE == 0
            && n % T::TILE == 0
            && m.min(n).min(k) >= tile_min_dim()
    }

    /// `C = A x B` with `A: m x k`, `B: k x n`, `C: m x n`, all row-major.
    #[track_caller]
    pub fn matmul<T: GemmElement>(
        &self,
        a: &[T],
        b: &[T],
        c: &mut [T],
        m: usize,
        n: usize,
        k: usize,
    ) {
        self.gemm(a, b, c, m, n, k, WriteMode::Overwrite);
    }

    /// [`matmul`](Self::matmul) with an explicit write mode.
    #[track_caller]
    #[allow(clippy::too_many_arguments)]
    pub fn gemm<T: GemmElement>(
        &self,
        a: &[T],
        b: &[T],
        c: &mut [T],
        m: usize,
        n: usize,
        k: usize,
        mode: WriteMode,
    ) {
        let (a, b, mut c) = gemm_operands(a, b, c, (m, n, k));
        let t = perf_start();
        let table = self.table::<T>();

        let kernel = match table.tile {
            Some(tile) if self.tile_eligible::<T>(m, n, k) => {
                let mut at = T::pool().checkout(m * k);
                unsafe {
                    (table.transpose.func)(a.as_ptr(), at.as_mut_ptr(), m, k, 0..m);
                    let call = GemmCall::transposed_lhs(
                        at.as_ptr(),
                        m,
                        b.as_ptr(),
                        n,
                        c.as_mut_ptr(),
                        n,
                        (m, n, k),
                        mode,
                    );
                    (tile.gemm.func)(&call);
                }
                tile.gemm.name
            }
            _ => {
                let (a, b) = (a.as_ptr(), b.as_ptr());
                let call = GemmCall::row_major(a, b, c.as_mut_ptr(), m, n, k, mode);
                unsafe { (table.matmul.func)(&call) };
                table.matmul.name
            }
        };
        perf_end::<T>(t, "matmul", kernel, m, n, k);
    }

    /// `C = A x B^T` with `A: m x k` and `B` stored `n x k`.
    #[track_caller]
    pub fn matmul_klast<T: GemmElement>(
        &self,
        a: &[T],
        b: &[T],
        c: &mut [T],
        m: usize,
        n: usize,
        k: usize,
    ) {
        let a = MatRef::operand("lhs", a, m, k);
        let b = MatRef::operand("rhs", b, n, k);
        let mut c = MatMut::operand("out", c, m, n);
        let t = perf_start();
        let entry = self.table::<T>().matmul_klast;
        let call = GemmCall::k_last(
            a.as_ptr(),
            b.as_ptr(),
            c.as_mut_ptr(),
            m,
            n,
            k,
            WriteMode::Overwrite,
        );
        unsafe { (entry.func)(&call) };
        perf_end::<T>(t, "matmul_klast", entry.name, m, n, k);
    }

    /// `C += A x B`, cache-blocked over `M` and `N` with the configured
    /// block size.
    #[track_caller]
    pub fn matmul_blocked<T: GemmElement>(
        &self,
        a: &[T],
        b: &[T],
        c: &mut [T],
        m: usize,
        n: usize,
        k: usize,
    ) {
        let (a, b, mut c) = gemm_operands(a, b, c, (m, n, k));
        let t = perf_start();
        let table = self.table::<T>();
        let block = block_size();

        let kernel = match table.tile {
            Some(tile) if m.min(n).min(k) >= tile_min_dim() => {
                let mut at = T::pool().checkout(m * k);
                unsafe {
                    (table.transpose.func)(a.as_ptr(), at.as_mut_ptr(), m, k, 0..m);
                    let call = GemmCall::transposed_lhs(
                        at.as_ptr(),
                        m,
                        b.as_ptr(),
                        n,
                        c.as_mut_ptr(),
                        n,
                        (m, n, k),
                        WriteMode::Accumulate,
                    );
                    (tile.blocked.func)(&call, block);
                }
                tile.blocked.name
            }
            _ => {
                let call = GemmCall::row_major(
                    a.as_ptr(),
                    b.as_ptr(),
                    c.as_mut_ptr(),
                    m,
                    n,
                    k,
                    WriteMode::Accumulate,
                );
                unsafe { (table.blocked.func)(&call, block) };
                table.blocked.name
            }
        };
        perf_end::<T>(t, "matmul_blocked", kernel, m, n, k);
    }

    /// `C (op)= A x B` with `A` given as its `k x m` transpose, `B` as
    /// `k x n` with row stride `ldb` and `C` as `m x n` with row stride
    /// `ldc`. Uses the tile kernel when the tile guard passes.
    #[track_caller]
    #[allow(clippy::too_many_arguments)]
    pub fn matmul_transposed_lhs<T: GemmElement>(
        &self,
        at: &[T],
        b: &[T],
        c: &mut [T],
        (m, n, k): (usize, usize, usize),
        ldb: usize,
        ldc: usize,
        mode: WriteMode,
    ) {
        require_len("transposed lhs", at.len(), elems(k, m));
        require_len("rhs", b.len(), strided_elems(k, n, ldb));
        require_len("out", c.len(), strided_elems(m, n, ldc));

        let table = self.table::<T>();
        let call = GemmCall::transposed_lhs(
            at.as_ptr(),
            m,
            b.as_ptr(),
            ldb,
            c.as_mut_ptr(),
            ldc,
            (m, n, k),
            mode,
        );
        unsafe {
            match table.tile {
                Some(tile) if self.tile_eligible::<T>(m, n, k) => (tile.gemm.func)(&call),
                _ => (table.matmul.func)(&call),
            }
        }
    }

    /// Write the `cols x rows` transpose of the row-major `src` into `dst`.
    #[track_caller]
    pub fn transpose<T: GemmElement>(&self, src: &[T], dst: &mut [T], rows: usize, cols: usize) {
        self.transpose_rows(src, dst, rows, cols, 0..rows);
    }

    /// Transpose only source rows `range` into the matching columns of `dst`.
    #[track_caller]
    pub fn transpose_rows<T: GemmElement>(
        &self,
        src: &[T],
        dst: &mut [T],
        rows: usize,
        cols: usize,
        range: Range<usize>,
    ) {
        let src = MatRef::operand("transpose source", src, rows, cols);
        let mut dst = MatMut::operand("transpose destination", dst, cols, rows);
        assert!(
            range.start <= range.end && range.end <= rows,
            "row range {:?} outside 0..{}",
            range,
            rows
        );
        let t = perf_start();
        let entry = self.table::<T>().transpose;
        unsafe { (entry.func)(src.as_ptr(), dst.as_mut_ptr(), rows, cols, range) };
        perf_end::<T>(t, "transpose", entry.name, rows, cols, 1);
    }
}

/// `C = A x B` through the process-wide dispatcher.
#[track_caller]
pub fn matmul<T: GemmElement>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) {
    dispatcher().matmul(a, b, c, m, n, k);
}

/// `C = A x B^T` with `B` stored `n x k`.
#[track_caller]
pub fn matmul_klast<T: GemmElement>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) {
    dispatcher().matmul_klast(a, b, c, m, n, k);
}

/// `C += A x B`, cache-blocked.
#[track_caller]
pub fn matmul_blocked<T: GemmElement>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) {
    dispatcher().matmul_blocked(a, b, c, m, n, k);
}

#[track_caller]
pub fn transpose<T: GemmElement>(src: &[T], dst: &mut [T], rows: usize, cols: usize) {
    dispatcher().transpose(src, dst, rows, cols);
}

#[track_caller]
pub fn transpose_rows<T: GemmElement>(
    src: &[T],
    dst: &mut [T],
    rows: usize,
    cols: usize,
    range: Range<usize>,
) {
    dispatcher().transpose_rows(src, dst, rows, cols, range);
}
