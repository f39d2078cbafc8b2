//! # tilemm sched
//!
//! Bounded worker pool and work-splitting policy used by the parallel GEMM
//! and fused quantized matmul paths.
//!
//! ```rust
//! use tilemm_sched::{feed_work_items, Parallelism, WorkQueue, WorkShape, WorkerPool};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let mut queue = WorkQueue::new();
//! let shape = WorkShape {
//!     batches: 4,
//!     lhs_cross: 64,
//!     rhs_cross: 64,
//!     lhs_block: 16,
//!     rhs_block: 16,
//! };
//! feed_work_items(&mut queue, shape, 2).unwrap();
//!
//! let pool = WorkerPool::new(Parallelism::from(2));
//! let covered = AtomicUsize::new(0);
//! pool.saturate(queue.close(), |item| {
//!     covered.fetch_add(item.batches.len(), Ordering::Relaxed);
//! });
//! assert_eq!(covered.into_inner(), 4);
//! ```

pub mod api;
mod core;
mod saf;

pub use saf::*;
