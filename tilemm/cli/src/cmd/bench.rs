use anyhow::{bail, Result};
use clap::Args;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tilemm_gemm::{Dispatcher, GemmElement};
use tilemm_sched::WorkerPool;

use super::{gflops, time_ms, Profile};

#[derive(Args)]
pub struct BenchArgs {
    /// Square problem sizes to time.
    #[arg(long, value_delimiter = ',', default_values_t = [64usize, 128, 256])]
    sizes: Vec<usize>,

    /// Timed runs per measurement; the median is reported.
    #[arg(long, default_value_t = 5)]
    runs: usize,

    /// Element type: f32 or f64.
    #[arg(long, default_value = "f32")]
    dtype: String,

    #[arg(long, value_enum, default_value_t = Profile::Env)]
    profile: Profile,

    /// Skip the scalar reference (slow at large sizes).
    #[arg(long)]
    no_scalar: bool,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

pub fn run(args: BenchArgs) -> Result<()> {
    args.profile.apply()?;
    match args.dtype.as_str() {
        "f32" => bench::<f32>(&args),
        "f64" => bench::<f64>(&args),
        other => bail!("unsupported dtype {:?} (expected f32 or f64)", other),
    }
}

fn bench<T: GemmElement>(args: &BenchArgs) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let detected = Dispatcher::detect();
    let scalar = Dispatcher::scalar();
    let pool = WorkerPool::from_config();
    log::info!(
        "[bench] {} via {} on {} workers, runs={}",
        T::NAME,
        detected.table::<T>().matmul.name,
        pool.parallelism(),
        args.runs
    );

    println!(
        "{:>6} {:>12} {:>12} {:>12} {:>12} {:>10}",
        "n", "scalar", "matmul", "blocked", "parallel", "max |err|"
    );
    for &n in &args.sizes {
        let a: Vec<T> = (0..n * n).map(|_| T::from_f64(rng.gen_range(-1.0..1.0))).collect();
        let b: Vec<T> = (0..n * n).map(|_| T::from_f64(rng.gen_range(-1.0..1.0))).collect();
        let mut c = vec![T::ZERO; n * n];
        let mut reference = vec![T::ZERO; n * n];

        let scalar_ms = if args.no_scalar {
            None
        } else {
            Some(time_ms(args.runs, || scalar.matmul(&a, &b, &mut reference, n, n, n)))
        };
        let matmul_ms = time_ms(args.runs, || detected.matmul(&a, &b, &mut c, n, n, n));
        let err = match scalar_ms {
            Some(_) => c
                .iter()
                .zip(&reference)
                .fold(0.0f64, |acc, (x, y)| acc.max((x.to_f64() - y.to_f64()).abs())),
            None => 0.0,
        };
        let blocked_ms = time_ms(args.runs, || {
            c.iter_mut().for_each(|v| *v = T::ZERO);
            detected.matmul_blocked(&a, &b, &mut c, n, n, n);
        });
        let parallel_ms =
            time_ms(args.runs, || detected.parallel_matmul(&pool, &a, &b, &mut c, n, n, n));

        log::debug!(
            "[bench] n={} matmul={:.3}ms blocked={:.3}ms parallel={:.3}ms",
            n,
            matmul_ms,
            blocked_ms,
            parallel_ms
        );
        let cell = |ms: f64| format!("{:.1} GF/s", gflops(n, n, n, ms));
        println!(
            "{:>6} {:>12} {:>12} {:>12} {:>12} {:>10.2e}",
            n,
            scalar_ms.map(cell).unwrap_or_else(|| "-".into()),
            cell(matmul_ms),
            cell(blocked_ms),
            cell(parallel_ms),
            err
        );
    }
    Ok(())
}
