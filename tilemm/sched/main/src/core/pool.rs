//! Bounded worker pool over scoped OS threads.
//!
//! Admission is tracked by a running count and an extra-slot counter behind
//! one mutex; a condvar wakes submitters blocked in `wait_to_start` or
//! `saturate` whenever a slot frees up or the queue being saturated drains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use tilemm_core::max_parallelism;

use crate::api::types::Parallelism;
use crate::core::queue::ClosedQueue;

#[derive(Debug, Default)]
struct PoolState {
    running: usize,
    /// Slots lent by workers blocked in a sleep section.
    extra: usize,
}

#[derive(Debug)]
pub struct WorkerPool {
    parallelism: Parallelism,
    state: Mutex<PoolState>,
    slot_freed: Condvar,
}

impl WorkerPool {
    pub fn new(parallelism: Parallelism) -> Self {
        Self {
            parallelism,
            state: Mutex::new(PoolState::default()),
            slot_freed: Condvar::new(),
        }
    }

    /// Pool limited by the globally applied `max_parallelism` setting.
    pub fn from_config() -> Self {
        Self::new(Parallelism::from(max_parallelism()))
    }

    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    /// Tasks currently holding a slot.
    pub fn running(&self) -> usize {
        self.lock().running
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_slot(&self, state: &PoolState) -> bool {
        match self.parallelism {
            Parallelism::Disabled => false,
            Parallelism::Unlimited => true,
            Parallelism::Bounded(n) => state.running < n.get() + state.extra,
        }
    }

    fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        if self.has_slot(&state) {
            state.running += 1;
            true
        } else {
            false
        }
    }

    fn acquire(&self) {
        let mut state = self.lock();
        while !self.has_slot(&state) {
            state = self
                .slot_freed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.running += 1;
    }

    /// Block until a slot frees up or `done` is set. Returns whether a slot
    /// was taken.
    fn acquire_unless(&self, done: &AtomicBool) -> bool {
        let mut state = self.lock();
        loop {
            if done.load(Ordering::Acquire) {
                return false;
            }
            if self.has_slot(&state) {
                state.running += 1;
                return true;
            }
            state = self
                .slot_freed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn release(&self) {
        let mut state = self.lock();
        state.running = state.running.saturating_sub(1);
        drop(state);
        self.slot_freed.notify_all();
    }

    fn signal_done(&self, done: &AtomicBool) {
        // Store under the lock so a submitter between its check and its wait
        // cannot miss the wakeup.
        let _state = self.lock();
        done.store(true, Ordering::Release);
        self.slot_freed.notify_all();
    }

    /// Declare the calling task about to block. While the guard lives the
    /// pool admits one extra task; dropping it (or calling
    /// [`SleepGuard::restart`]) restores the budget.
    pub fn sleep(&self) -> SleepGuard<'_> {
        let mut state = self.lock();
        state.extra += 1;
        drop(state);
        self.slot_freed.notify_all();
        SleepGuard { pool: self }
    }

    /// Run `f` with a scope in which tasks can be admitted to this pool.
    /// All tasks are joined before `scope` returns.
    pub fn scope<'env, F, R>(&'env self, f: F) -> R
    where
        F: for<'scope> FnOnce(&PoolScope<'scope, 'env>) -> R,
    {
        thread::scope(|scope| f(&PoolScope { pool: self, scope }))
    }

    /// Drain `queue` with as many workers as the limit allows, never more
    /// than there are items. Spawning stops as soon as any worker finds the
    /// queue empty. Returns the number of workers that ran; a disabled pool
    /// drains inline and reports one.
    pub fn saturate<T, W>(&self, queue: ClosedQueue<T>, worker: W) -> usize
    where
        T: Send,
        W: Fn(T) + Sync,
    {
        let total = queue.total();
        if total == 0 {
            return 0;
        }
        let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };

        if self.parallelism == Parallelism::Disabled {
            while let Some(item) = queue.pop() {
                worker(item);
            }
            return 1;
        }

        let done = AtomicBool::new(false);
        let started = thread::scope(|scope| {
            let mut started = 0;
            while started < total && self.acquire_unless(&done) {
                started += 1;
                let slot = SlotGuard { pool: self };
                let (queue, worker, done) = (&queue, &worker, &done);
                scope.spawn(move || {
                    let _slot = slot;
                    while let Some(item) = queue.pop() {
                        worker(item);
                    }
                    self.signal_done(done);
                });
            }
            started
        });

        if let Some(t) = _t {
            log::trace!(
                "[perf] sched::saturate items={} workers={} limit={} {:.3}ms",
                total,
                started,
                self.parallelism,
                t.elapsed().as_secs_f64() * 1000.0
            );
        }
        started
    }
}

/// Admission handle passed to the closure of [`WorkerPool::scope`].
pub struct PoolScope<'scope, 'env: 'scope> {
    pool: &'env WorkerPool,
    scope: &'scope thread::Scope<'scope, 'env>,
}

impl<'scope, 'env> PoolScope<'scope, 'env> {
    /// Start `task` if a slot is free right now. Returns `false` without
    /// running it otherwise. A disabled pool runs the task inline.
    pub fn try_start<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'scope,
    {
        if self.pool.parallelism == Parallelism::Disabled {
            task();
            return true;
        }
        if !self.pool.try_acquire() {
            return false;
        }
        self.spawn_admitted(task);
        true
    }

    /// Start `task`, blocking until a slot is free. A disabled pool runs the
    /// task inline.
    pub fn wait_to_start<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'scope,
    {
        if self.pool.parallelism == Parallelism::Disabled {
            task();
            return;
        }
        self.pool.acquire();
        self.spawn_admitted(task);
    }

    pub fn pool(&self) -> &'env WorkerPool {
        self.pool
    }

    fn spawn_admitted<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'scope,
    {
        let slot = SlotGuard { pool: self.pool };
        self.scope.spawn(move || {
            let _slot = slot;
            task();
        });
    }
}

/// Releases an admitted task's slot on every exit path.
struct SlotGuard<'a> {
    pool: &'a WorkerPool,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.pool.release();
    }
}

/// An extra slot lent to the pool by a task that is about to block.
#[must_use = "the lent slot is returned as soon as the guard is dropped"]
pub struct SleepGuard<'a> {
    pool: &'a WorkerPool,
}

impl SleepGuard<'_> {
    /// Resume CPU-bound work, returning the lent slot.
    pub fn restart(self) {}
}

impl Drop for SleepGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.pool.lock();
        state.extra = state.extra.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::queue::WorkQueue;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    fn bounded(n: i64) -> WorkerPool {
        WorkerPool::new(Parallelism::from(n))
    }

    fn queue_of(n: usize) -> ClosedQueue<usize> {
        let mut queue = WorkQueue::new();
        for i in 0..n {
            queue.push(i);
        }
        queue.close()
    }

    #[test]
    fn test_disabled_runs_inline() {
        let pool = bounded(0);
        let caller = thread::current().id();
        let ran_on = Mutex::new(None);
        pool.scope(|s| {
            assert!(s.try_start(|| {
                *ran_on.lock().unwrap() = Some(thread::current().id());
            }));
        });
        assert_eq!(ran_on.into_inner().unwrap(), Some(caller));
    }

    #[test]
    fn test_try_start_rejects_when_full() {
        let pool = bounded(1);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        pool.scope(|s| {
            assert!(s.try_start(move || {
                release_rx.recv().unwrap();
            }));
            assert_eq!(s.pool().running(), 1);
            assert!(!s.try_start(|| {}));
            release_tx.send(()).unwrap();
        });
        assert_eq!(pool.running(), 0);
    }

    #[test]
    fn test_wait_to_start_respects_bound() {
        let pool = bounded(2);
        let live = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        pool.scope(|s| {
            for _ in 0..8 {
                s.wait_to_start(|| {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    live.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.running(), 0);
    }

    #[test]
    fn test_sleep_lends_a_slot() {
        let pool = bounded(1);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (asleep_tx, asleep_rx) = mpsc::channel::<()>();
        pool.scope(|s| {
            let pool = s.pool();
            assert!(s.try_start(move || {
                let guard = pool.sleep();
                asleep_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                guard.restart();
            }));
            asleep_rx.recv().unwrap();
            // The sleeping task lent its slot.
            assert!(s.try_start(|| {}));
            release_tx.send(()).unwrap();
        });
        assert_eq!(pool.lock().extra, 0);
    }

    #[test]
    fn test_slot_released_when_task_panics() {
        let pool = bounded(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pool.scope(|s| {
                s.wait_to_start(|| panic!("task failed"));
            });
        }));
        assert!(result.is_err());
        assert_eq!(pool.running(), 0);
    }

    #[test]
    fn test_saturate_drains_everything() {
        let pool = bounded(4);
        let sum = AtomicUsize::new(0);
        let workers = pool.saturate(queue_of(100), |i| {
            sum.fetch_add(i, Ordering::Relaxed);
        });
        assert_eq!(sum.into_inner(), 99 * 100 / 2);
        assert!((1..=4).contains(&workers));
        assert_eq!(pool.running(), 0);
    }

    #[test]
    fn test_saturate_never_spawns_more_than_items() {
        let pool = WorkerPool::new(Parallelism::Unlimited);
        let count = AtomicUsize::new(0);
        let workers = pool.saturate(queue_of(3), |_| {
            count.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(count.into_inner(), 3);
        assert!(workers <= 3);
    }

    #[test]
    fn test_saturate_disabled_inline() {
        let pool = bounded(0);
        let caller = thread::current().id();
        let workers = pool.saturate(queue_of(5), |_| {
            assert_eq!(thread::current().id(), caller);
        });
        assert_eq!(workers, 1);
    }

    #[test]
    fn test_saturate_empty_queue() {
        let pool = bounded(4);
        assert_eq!(pool.saturate(queue_of(0), |_| unreachable!()), 0);
    }
}
