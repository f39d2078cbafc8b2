//! Scheduling types shared by the pool and the splitting policy

use std::num::NonZeroUsize;
use std::ops::Range;

/// Concurrency limit of a [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// Every task runs inline on the submitting thread.
    Disabled,
    /// Every task gets its own thread.
    Unlimited,
    /// At most `n` tasks run at once, plus any slots lent by sleepers.
    Bounded(NonZeroUsize),
}

impl From<i64> for Parallelism {
    /// `0` disables, a negative value is unlimited, a positive value bounds.
    fn from(limit: i64) -> Self {
        match usize::try_from(limit) {
            Err(_) => Parallelism::Unlimited,
            Ok(n) => match NonZeroUsize::new(n) {
                None => Parallelism::Disabled,
                Some(n) => Parallelism::Bounded(n),
            },
        }
    }
}

impl Parallelism {
    /// Worker budget used when splitting work for this limit.
    pub fn workers(&self) -> usize {
        match self {
            Parallelism::Disabled => 1,
            Parallelism::Bounded(n) => n.get(),
            Parallelism::Unlimited => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

impl std::fmt::Display for Parallelism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Parallelism::Disabled => write!(f, "disabled"),
            Parallelism::Unlimited => write!(f, "unlimited"),
            Parallelism::Bounded(n) => write!(f, "bounded({})", n),
        }
    }
}

/// One unit of GEMM work: a batch range crossed with an output row range
/// and an output column range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub batches: Range<usize>,
    /// Rows of the left operand (rows of the output).
    pub lhs: Range<usize>,
    /// Columns of the right operand (columns of the output).
    pub rhs: Range<usize>,
}

impl WorkItem {
    /// Number of output elements covered, across all batches.
    pub fn volume(&self) -> usize {
        self.batches.len() * self.lhs.len() * self.rhs.len()
    }
}

/// Problem shape handed to [`feed_work_items`](crate::feed_work_items).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkShape {
    pub batches: usize,
    /// Output rows per batch.
    pub lhs_cross: usize,
    /// Output columns per batch.
    pub rhs_cross: usize,
    /// Row split granularity.
    pub lhs_block: usize,
    /// Column split granularity.
    pub rhs_block: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_from_setting() {
        assert_eq!(Parallelism::from(0), Parallelism::Disabled);
        assert_eq!(Parallelism::from(-1), Parallelism::Unlimited);
        assert_eq!(Parallelism::from(i64::MIN), Parallelism::Unlimited);
        assert_eq!(
            Parallelism::from(3),
            Parallelism::Bounded(NonZeroUsize::new(3).unwrap())
        );
    }

    #[test]
    fn test_workers() {
        assert_eq!(Parallelism::Disabled.workers(), 1);
        assert_eq!(Parallelism::from(6).workers(), 6);
        assert!(Parallelism::Unlimited.workers() >= 1);
    }

    #[test]
    fn test_item_volume() {
        let item = WorkItem { batches: 0..2, lhs: 0..3, rhs: 4..8 };
        assert_eq!(item.volume(), 24);
    }
}
