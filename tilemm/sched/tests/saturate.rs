use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tilemm_sched::{feed_work_items, Parallelism, WorkItem, WorkQueue, WorkShape, WorkerPool};

fn run(shape: WorkShape, limit: i64) -> Vec<u32> {
    let pool = WorkerPool::new(Parallelism::from(limit));
    let mut queue = WorkQueue::new();
    feed_work_items(&mut queue, shape, pool.parallelism().workers()).unwrap();

    let cells = shape.batches * shape.lhs_cross * shape.rhs_cross;
    let hits = Mutex::new(vec![0u32; cells]);
    pool.saturate(queue.close(), |item: WorkItem| {
        let mut hits = hits.lock().unwrap();
        for b in item.batches.clone() {
            for i in item.lhs.clone() {
                for j in item.rhs.clone() {
                    hits[(b * shape.lhs_cross + i) * shape.rhs_cross + j] += 1;
                }
            }
        }
    });
    hits.into_inner().unwrap()
}

#[test]
fn test_items_drained_exactly_once_per_limit() {
    let shape = WorkShape {
        batches: 3,
        lhs_cross: 70,
        rhs_cross: 33,
        lhs_block: 16,
        rhs_block: 16,
    };
    for limit in [0, 1, 2, 4, -1] {
        let hits = run(shape, limit);
        assert!(hits.iter().all(|&h| h == 1), "limit {}", limit);
    }
}

#[test]
fn test_saturate_respects_bound() {
    let pool = WorkerPool::new(Parallelism::from(3));
    let mut queue = WorkQueue::new();
    for i in 0..64 {
        queue.push(i);
    }
    let live = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let workers = pool.saturate(queue.close(), |_| {
        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        std::thread::yield_now();
        live.fetch_sub(1, Ordering::SeqCst);
    });
    assert!(workers <= 3);
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(pool.running(), 0);
}
