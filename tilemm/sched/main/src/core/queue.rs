//! Single-producer work queue.
//!
//! Items are pushed into a [`WorkQueue`] by one owner, then `close()`
//! converts it into a [`ClosedQueue`] that workers drain concurrently. No
//! push can happen after close, so draining never races with production.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
pub struct WorkQueue<T> {
    items: VecDeque<T>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Stop accepting items and hand the queue to consumers.
    pub fn close(self) -> ClosedQueue<T> {
        ClosedQueue {
            total: self.items.len(),
            items: Mutex::new(self.items),
        }
    }
}

/// A populated queue that only supports removal, safe to share across workers.
#[derive(Debug)]
pub struct ClosedQueue<T> {
    items: Mutex<VecDeque<T>>,
    total: usize,
}

impl<T> ClosedQueue<T> {
    /// Take the next item, or `None` once the queue is drained.
    pub fn pop(&self) -> Option<T> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Items still waiting.
    pub fn remaining(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Items the queue held when it was closed.
    pub fn total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_after_close() {
        let mut queue = WorkQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.len(), 3);

        let closed = queue.close();
        assert_eq!(closed.total(), 3);
        assert_eq!(closed.pop(), Some(1));
        assert_eq!(closed.remaining(), 2);
        assert_eq!(closed.pop(), Some(2));
        assert_eq!(closed.pop(), Some(3));
        assert_eq!(closed.pop(), None);
        assert_eq!(closed.total(), 3);
    }

    #[test]
    fn test_concurrent_drain_takes_each_once() {
        let mut queue = WorkQueue::new();
        for i in 0..1000u64 {
            queue.push(i);
        }
        let closed = queue.close();
        let sums: Vec<u64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        let mut sum = 0;
                        while let Some(v) = closed.pop() {
                            sum += v;
                        }
                        sum
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(sums.iter().sum::<u64>(), 999 * 1000 / 2);
    }
}
