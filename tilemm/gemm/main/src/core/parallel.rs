//! Parallel GEMM and transpose.
//!
//! Batched GEMM splits the output with `feed_work_items` and drains the
//! items on a [`WorkerPool`]. When the tile guard passes, the left operands
//! are first transposed into one shared buffer by pool tasks that each own a
//! disjoint row range; every worker then reads that buffer concurrently.

use std::ops::Range;
use std::time::Instant;

use rayon::prelude::*;
use tilemm_core::{block_size, parallel_threshold, require_len, DisjointMut, WriteMode};
use tilemm_sched::{feed_work_items, Parallelism, WorkItem, WorkQueue, WorkShape, WorkerPool};

use crate::api::types::{GemmCall, GemmElement, KernelTable};
use crate::core::dispatch::{dispatcher, Dispatcher};
use crate::core::ops::elems;
use crate::core::transpose::STAGE;

impl Dispatcher {
    /// `C = A x B` spread over `pool`.
    #[track_caller]
    #[allow(clippy::too_many_arguments)]
    pub fn parallel_matmul<T: GemmElement>(
        &self,
        pool: &WorkerPool,
        a: &[T],
        b: &[T],
        c: &mut [T],
        m: usize,
        n: usize,
        k: usize,
    ) {
        self.parallel_batched_matmul(pool, a, b, c, 1, m, n, k);
    }

    /// `C[i] = A[i] x B[i]` for `batches` contiguous row-major problems.
    ///
    /// Runs serially below the parallel threshold or on a disabled pool.
    #[track_caller]
    #[allow(clippy::too_many_arguments)]
    pub fn parallel_batched_matmul<T: GemmElement>(
        &self,
        pool: &WorkerPool,
        a: &[T],
        b: &[T],
        c: &mut [T],
        batches: usize,
        m: usize,
        n: usize,
        k: usize,
    ) {
        let (a_len, b_len, c_len) = (elems(m, k), elems(k, n), elems(m, n));
        require_len("lhs", a.len(), elems(batches, a_len));
        require_len("rhs", b.len(), elems(batches, b_len));
        require_len("out", c.len(), elems(batches, c_len));
        if batches == 0 || c_len == 0 {
            return;
        }

        let work = batches.saturating_mul(c_len).saturating_mul(k.max(1));
        if pool.parallelism() == Parallelism::Disabled || work < parallel_threshold() {
            for i in 0..batches {
                self.matmul(
                    &a[i * a_len..(i + 1) * a_len],
                    &b[i * b_len..(i + 1) * b_len],
                    &mut c[i * c_len..(i + 1) * c_len],
                    m,
                    n,
                    k,
                );
            }
            return;
        }

        let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };
        let table = self.table::<T>();
        let tiled = table.tile.filter(|_| self.tile_eligible::<T>(m, n, k));
        let workers = pool.parallelism().workers();
        let block = match tiled {
            Some(_) => block_size().div_ceil(T::TILE) * T::TILE,
            None => block_size(),
        };

        let mut queue = WorkQueue::new();
        let shape = WorkShape {
            batches,
            lhs_cross: m,
            rhs_cross: n,
            lhs_block: block,
            rhs_block: block,
        };
        if let Err(err) = feed_work_items(&mut queue, shape, workers) {
            log::debug!("[parallel] {}; running serially", err);
            let serial = WorkerPool::new(Parallelism::Disabled);
            self.parallel_batched_matmul(&serial, a, b, c, batches, m, n, k);
            return;
        }

        let at = tiled.map(|_| {
            let mut buf = T::pool().checkout(batches * a_len);
            transpose_batches(pool, table, a, &mut buf, batches, m, k, workers);
            buf
        });
        let at: &[T] = at.as_deref().unwrap_or(&[]);
        let out = DisjointMut::new(&mut c[..batches * c_len]);

        let spawned = pool.saturate(queue.close(), |item: WorkItem| {
            for i in item.batches.clone() {
                // Items cover disjoint (batch, row, column) regions of `out`.
                unsafe {
                    let b_ptr = b.as_ptr().add(i * b_len);
                    let c_ptr = out.as_mut_ptr().add(i * c_len);
                    let (rows, cols) = (item.lhs.clone(), item.rhs.clone());
                    let mode = WriteMode::Overwrite;
                    match tiled {
                        Some(tile) => {
                            let at_ptr = at.as_ptr().add(i * a_len);
                            let dims = (m, n, k);
                            let full = GemmCall::transposed_lhs(
                                at_ptr, m, b_ptr, n, c_ptr, n, dims, mode,
                            );
                            (tile.blocked.func)(&full.sub(rows, cols), block);
                        }
                        None => {
                            let a_ptr = a.as_ptr().add(i * a_len);
                            let full = GemmCall::row_major(a_ptr, b_ptr, c_ptr, m, n, k, mode);
                            (table.matmul.func)(&full.sub(rows, cols));
                        }
                    }
                }
            }
        });

        if let Some(t) = _t {
            log::trace!(
                "[perf] gemm::parallel_batched<{}> {}x[{}x{}]x[{}x{}] workers={} via {} {:.3}ms",
                T::NAME,
                batches,
                m,
                k,
                k,
                n,
                spawned,
                tiled.map(|tile| tile.blocked.name).unwrap_or(table.matmul.name),
                t.elapsed().as_secs_f64() * 1000.0
            );
        }
    }

    /// Transpose on the rayon pool, one strided row range per task.
    #[track_caller]
    pub fn parallel_transpose<T: GemmElement>(
        &self,
        src: &[T],
        dst: &mut [T],
        rows: usize,
        cols: usize,
    ) {
        let size = elems(rows, cols);
        require_len("transpose source", src.len(), size);
        require_len("transpose destination", dst.len(), size);
        if size < parallel_threshold() {
            self.transpose(src, dst, rows, cols);
            return;
        }

        let transpose = self.table::<T>().transpose.func;
        let chunk = rows.div_ceil(rayon::current_num_threads()).max(STAGE);
        let out = DisjointMut::new(&mut dst[..size]);
        (0..rows.div_ceil(chunk)).into_par_iter().for_each(|piece| {
            let range = piece * chunk..((piece + 1) * chunk).min(rows);
            // Each task writes only the destination columns of its own rows.
            unsafe { transpose(src.as_ptr(), out.as_mut_ptr(), rows, cols, range) };
        });
    }
}

/// Fill `at` with the per-batch transposes of `a`, split over pool tasks
/// that each own a disjoint source row range.
#[allow(clippy::too_many_arguments)]
fn transpose_batches<T: GemmElement>(
    pool: &WorkerPool,
    table: &KernelTable<T>,
    a: &[T],
    at: &mut [T],
    batches: usize,
    m: usize,
    k: usize,
    workers: usize,
) {
    let a_len = m * k;
    let rows_per_task = if batches >= workers {
        m
    } else {
        m.div_ceil(workers.div_ceil(batches)).max(1)
    };
    let transpose = table.transpose.func;
    let dst = DisjointMut::new(at);
    let dst = &dst;

    pool.scope(|s| {
        for i in 0..batches {
            let src = &a[i * a_len..(i + 1) * a_len];
            for r0 in (0..m).step_by(rows_per_task) {
                let rows: Range<usize> = r0..(r0 + rows_per_task).min(m);
                s.wait_to_start(move || unsafe {
                    transpose(src.as_ptr(), dst.as_mut_ptr().add(i * a_len), m, k, rows);
                });
            }
        }
    });
}

/// `C = A x B` on a pool sized by the global `max_parallelism` setting.
#[track_caller]
pub fn parallel_matmul<T: GemmElement>(
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    n: usize,
    k: usize,
) {
    dispatcher().parallel_matmul(&WorkerPool::from_config(), a, b, c, m, n, k);
}

/// Batched `C[i] = A[i] x B[i]` on a pool sized by `max_parallelism`.
#[track_caller]
pub fn parallel_batched_matmul<T: GemmElement>(
    a: &[T],
    b: &[T],
    c: &mut [T],
    batches: usize,
    m: usize,
    n: usize,
    k: usize,
) {
    dispatcher().parallel_batched_matmul(&WorkerPool::from_config(), a, b, c, batches, m, n, k);
}

#[track_caller]
pub fn parallel_transpose<T: GemmElement>(src: &[T], dst: &mut [T], rows: usize, cols: usize) {
    dispatcher().parallel_transpose(src, dst, rows, cols);
}
