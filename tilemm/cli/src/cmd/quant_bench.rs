use anyhow::{Context, Result};
use clap::Args;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tilemm_gemm::dispatcher;
use tilemm_quant::{dequantize, quantize, Activation, FusedMatmul, QuantScheme};
use tilemm_sched::WorkerPool;

use super::{gflops, time_ms, Profile};

#[derive(Args)]
pub struct QuantBenchArgs {
    /// Input rows.
    #[arg(short, long, default_value_t = 32)]
    m: usize,

    /// Reduction dimension.
    #[arg(short, long, default_value_t = 512)]
    k: usize,

    /// Output columns.
    #[arg(short, long, default_value_t = 512)]
    n: usize,

    #[arg(long, default_value_t = 64)]
    group_size: usize,

    /// Schemes to time: nf4, int4, int8.
    #[arg(long, value_delimiter = ',', default_values = ["nf4", "int4", "int8"])]
    schemes: Vec<String>,

    #[arg(long, default_value_t = 5)]
    runs: usize,

    #[arg(long, value_enum, default_value_t = Profile::Env)]
    profile: Profile,

    #[arg(long, default_value_t = 7)]
    seed: u64,
}

pub fn run(args: QuantBenchArgs) -> Result<()> {
    args.profile.apply()?;
    let (m, k, n) = (args.m, args.k, args.n);
    let mut rng = StdRng::seed_from_u64(args.seed);
    let input: Vec<f32> = (0..m * k).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let weights: Vec<f32> = (0..k * n).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let engine = FusedMatmul::new(dispatcher());
    let pool = WorkerPool::from_config();
    println!("kernel: {:?}", engine.kernels().matmul);
    println!(
        "{:>6} {:>12} {:>12} {:>12} {:>10}",
        "scheme", "fused", "parallel", "swiglu", "max |err|"
    );

    for name in &args.schemes {
        let scheme: QuantScheme = name.parse()?;
        let q = quantize(scheme, &weights, k, n, args.group_size)
            .with_context(|| format!("Failed to quantize {}x{} weights as {}", k, n, scheme))?;
        let w = q.view();
        log::debug!(
            "[quant-bench] {} packed {} bytes, {} groups of {}",
            scheme,
            w.packed().len(),
            w.num_groups(),
            w.group_size()
        );

        let dense = dequantize(&w);
        let mut reference = vec![0.0f32; m * n];
        dispatcher().matmul(&input, &dense, &mut reference, m, n, k);

        let mut out = vec![0.0f32; m * n];
        let fused_ms = time_ms(args.runs, || {
            engine.fused_matmul(&input, &w, &mut out, m, Activation::Identity)
        });
        let err = out
            .iter()
            .zip(&reference)
            .fold(0.0f32, |acc, (a, b)| acc.max((a - b).abs()));
        let parallel_ms = time_ms(args.runs, || {
            engine.parallel_fused_matmul(&pool, &input, &w, &mut out, m, Activation::Identity)
        });
        let swiglu_ms = time_ms(args.runs, || engine.fused_swiglu(&input, &w, &w, &mut out, m));

        let cell = |ms: f64| format!("{:.1} GF/s", gflops(m, n, k, ms));
        println!(
            "{:>6} {:>12} {:>12} {:>12} {:>10.2e}",
            scheme,
            cell(fused_ms),
            cell(parallel_ms),
            cell(swiglu_ms),
            err
        );
    }
    Ok(())
}
