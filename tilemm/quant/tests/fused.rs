use tilemm_gemm::Dispatcher;
use tilemm_quant::{
    dequantize, quantize_int4, quantize_int8, quantize_nf4, Activation, FusedKernels, FusedMatmul,
    QuantScheme, QuantizedWeights,
};
use tilemm_sched::{Parallelism, WorkerPool};

fn data(len: usize, seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
        })
        .collect()
}

#[test]
fn test_fused_equals_dequantize_then_matmul() {
    let (m, k, n) = (48, 96, 192);
    let input = data(m * k, 1);
    let raw = data(k * n, 2);
    let d = Dispatcher::detect();
    let engine = FusedMatmul::new(&d);
    for q in [
        quantize_nf4(&raw, k, n, 64).unwrap(),
        quantize_int4(&raw, k, n, 64).unwrap(),
        quantize_int8(&raw, k, n, 32).unwrap(),
    ] {
        let dense = dequantize(&q.view());
        let mut expected = vec![0.0f32; m * n];
        d.matmul(&input, &dense, &mut expected, m, n, k);

        let mut out = vec![0.0f32; m * n];
        engine.fused_matmul(&input, &q.view(), &mut out, m, Activation::Identity);
        for (a, b) in out.iter().zip(&expected) {
            assert!((a - b).abs() <= 1e-4 * k as f32, "{}: {} vs {}", q.scheme, a, b);
        }
    }
}

#[test]
fn test_scalar_dispatcher_uses_elementwise_kernel() {
    let d = Dispatcher::scalar();
    let engine = FusedMatmul::new(&d);
    assert_eq!(engine.kernels().matmul.name, "fused-elementwise");
    assert!(!engine.kernels().transposed_input);

    let detected = Dispatcher::detect();
    let bound = FusedKernels::bind(&detected);
    let has_vector_stage = detected.stages().iter().any(|s| *s == tilemm_gemm::Stage::Arch);
    assert_eq!(bound.transposed_input, has_vector_stage);
}

#[test]
fn test_parallel_fused_exact_cover() {
    let (m, k, n) = (40, 128, 333);
    let input = data(m * k, 3);
    let q = quantize_int4(&data(k * n, 4), k, n, 32).unwrap();
    let d = Dispatcher::detect();
    let engine = FusedMatmul::new(&d);

    let mut serial = vec![0.0f32; m * n];
    engine.fused_matmul(&input, &q.view(), &mut serial, m, Activation::Silu);

    let pool = WorkerPool::new(Parallelism::from(4));
    let mut parallel = vec![f32::NAN; m * n];
    engine.parallel_fused_matmul(&pool, &input, &q.view(), &mut parallel, m, Activation::Silu);
    assert_eq!(serial, parallel);
}

#[test]
fn test_view_over_foreign_buffers() {
    // 2x3 Int8 weights, group size 2: scales per (k, group) = 2 x 2.
    let packed = [1u8, 2, 3, 0xFF, 0xFE, 0xFD];
    let scales = [1.0f32, 10.0, 0.5, 2.0];
    let w = QuantizedWeights::new(QuantScheme::Int8, &packed, &scales, 2, 3, 2).unwrap();
    assert_eq!(w.num_groups(), 2);
    assert_eq!(dequantize(&w), vec![1.0, 2.0, 30.0, -0.5, -1.0, -6.0]);

    let mut out = [0.0f32; 3];
    tilemm_quant::fused_matmul(&[1.0, 1.0], &w, &mut out, 1, Activation::Relu);
    assert_eq!(out, [0.5, 1.0, 24.0]);
}
