//! Work-splitting policy for batched GEMM.

use std::ops::Range;

use crate::api::error::{SchedError, SchedResult};
use crate::api::types::{WorkItem, WorkShape};
use crate::core::queue::WorkQueue;

/// Split `shape` into work items for a budget of `workers` and push them
/// onto `queue`. Returns the number of items pushed.
///
/// - With at least two batches per worker, only the batch axis is split,
///   evenly into `workers` ranges.
/// - Otherwise `(batches / workers) * workers` whole batches become one item
///   each. Each of the `r` remaining batches is split along its larger cross
///   axis into `ceil(workers / r)` pieces, every piece a multiple of that
///   axis's block and never smaller than one block.
///
/// Together the items cover every `(batch, row, column)` exactly once.
pub fn feed_work_items(
    queue: &mut WorkQueue<WorkItem>,
    shape: WorkShape,
    workers: usize,
) -> SchedResult<usize> {
    if workers == 0 {
        return Err(SchedError::NoWorkers);
    }
    if shape.lhs_block == 0 {
        return Err(SchedError::ZeroBlock { axis: "lhs" });
    }
    if shape.rhs_block == 0 {
        return Err(SchedError::ZeroBlock { axis: "rhs" });
    }

    let WorkShape { batches, lhs_cross, rhs_cross, .. } = shape;
    if batches == 0 || lhs_cross == 0 || rhs_cross == 0 {
        return Ok(0);
    }

    let before = queue.len();
    let whole_lhs = 0..lhs_cross;
    let whole_rhs = 0..rhs_cross;

    if batches >= 2 * workers {
        for batch_range in even_ranges(batches, workers) {
            queue.push(WorkItem {
                batches: batch_range,
                lhs: whole_lhs.clone(),
                rhs: whole_rhs.clone(),
            });
        }
        return Ok(queue.len() - before);
    }

    let whole = (batches / workers) * workers;
    for b in 0..whole {
        queue.push(WorkItem {
            batches: b..b + 1,
            lhs: whole_lhs.clone(),
            rhs: whole_rhs.clone(),
        });
    }

    let remaining = batches - whole;
    if remaining > 0 {
        let factor = workers.div_ceil(remaining);
        let split_lhs = lhs_cross >= rhs_cross;
        let (dim, block) = if split_lhs {
            (lhs_cross, shape.lhs_block)
        } else {
            (rhs_cross, shape.rhs_block)
        };
        let chunk = dim.div_ceil(factor).div_ceil(block) * block;

        for b in whole..batches {
            for piece in chunked(dim, chunk) {
                let (lhs, rhs) = if split_lhs {
                    (piece, whole_rhs.clone())
                } else {
                    (whole_lhs.clone(), piece)
                };
                queue.push(WorkItem { batches: b..b + 1, lhs, rhs });
            }
        }
    }

    let pushed = queue.len() - before;
    log::debug!(
        "[sched] {} batches x {}x{} over {} workers -> {} items",
        batches,
        lhs_cross,
        rhs_cross,
        workers,
        pushed
    );
    Ok(pushed)
}

/// `parts` contiguous ranges covering `0..len`, sizes differing by at most one.
fn even_ranges(len: usize, parts: usize) -> impl Iterator<Item = Range<usize>> {
    let base = len / parts;
    let extra = len % parts;
    (0..parts).scan(0, move |start, i| {
        let size = base + usize::from(i < extra);
        let range = *start..*start + size;
        *start += size;
        Some(range)
    })
}

fn chunked(len: usize, chunk: usize) -> impl Iterator<Item = Range<usize>> {
    (0..len)
        .step_by(chunk)
        .map(move |start| start..(start + chunk).min(len))
}
