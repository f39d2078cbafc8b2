use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tilemm_gemm::Dispatcher;
use tilemm_sched::WorkerPool;

fn random(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn bench_matmul(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let scalar = Dispatcher::scalar();
    let detected = Dispatcher::detect();
    let pool = WorkerPool::from_config();

    let mut group = c.benchmark_group("matmul_f32");
    for n in [64usize, 128, 256] {
        let a = random(&mut rng, n * n);
        let b = random(&mut rng, n * n);
        let mut out = vec![0.0f32; n * n];

        group.bench_with_input(BenchmarkId::new("scalar", n), &n, |bench, &n| {
            bench.iter(|| scalar.matmul(black_box(&a), black_box(&b), &mut out, n, n, n))
        });
        group.bench_with_input(BenchmarkId::new("dispatched", n), &n, |bench, &n| {
            bench.iter(|| detected.matmul(black_box(&a), black_box(&b), &mut out, n, n, n))
        });
        group.bench_with_input(BenchmarkId::new("blocked", n), &n, |bench, &n| {
            bench.iter(|| detected.matmul_blocked(black_box(&a), black_box(&b), &mut out, n, n, n))
        });
        group.bench_with_input(BenchmarkId::new("parallel", n), &n, |bench, &n| {
            bench.iter(|| {
                detected.parallel_matmul(&pool, black_box(&a), black_box(&b), &mut out, n, n, n)
            })
        });
    }
    group.finish();
}

fn bench_transpose(c: &mut Criterion) {
    let detected = Dispatcher::detect();
    let mut group = c.benchmark_group("transpose_f32");
    for n in [256usize, 1024, 2048] {
        let src: Vec<f32> = (0..n * n).map(|i| i as f32).collect();
        let mut dst = vec![0.0f32; n * n];
        group.bench_with_input(BenchmarkId::new("serial", n), &n, |bench, &n| {
            bench.iter(|| detected.transpose(black_box(&src), &mut dst, n, n))
        });
        group.bench_with_input(BenchmarkId::new("parallel", n), &n, |bench, &n| {
            bench.iter(|| detected.parallel_transpose(black_box(&src), &mut dst, n, n))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_matmul, bench_transpose);
criterion_main!(benches);
