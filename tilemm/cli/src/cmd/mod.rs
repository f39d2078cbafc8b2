pub mod bench;
pub mod info;
pub mod quant_bench;

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use tilemm_core::{OptProfile, RuntimeConfig};

#[derive(Subcommand)]
pub enum Command {
    /// Print detected CPU capabilities and the bound kernel table.
    Info(info::InfoArgs),

    /// Time dense f32/f64 GEMM on the bound kernels against the scalar reference.
    Bench(bench::BenchArgs),

    /// Time fused quantized matmul for each scheme.
    QuantBench(quant_bench::QuantBenchArgs),
}

/// Runtime preset applied before any kernel runs.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Profile {
    /// Environment overrides on top of the defaults.
    Env,
    Optimized,
    Baseline,
    Aggressive,
}

impl Profile {
    pub fn apply(self) -> Result<RuntimeConfig> {
        let config = match self {
            Profile::Env => RuntimeConfig::from_env().context("Invalid TILEMM_* environment")?,
            Profile::Optimized => OptProfile::Optimized.runtime_config(),
            Profile::Baseline => OptProfile::Baseline.runtime_config(),
            Profile::Aggressive => OptProfile::Aggressive.runtime_config(),
        };
        config.apply().context("Failed to apply runtime configuration")?;
        log::debug!("[cli] profile {:?}: {:?}", self, config);
        Ok(config)
    }
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Info(_) => "info",
            Command::Bench(_) => "bench",
            Command::QuantBench(_) => "quant-bench",
        }
    }
}

pub fn run(command: Command) -> Result<()> {
    let name = command.name();
    log::info!("[cli] running {}", name);
    let result = match command {
        Command::Info(args) => info::run(args),
        Command::Bench(args) => bench::run(args),
        Command::QuantBench(args) => quant_bench::run(args),
    };
    if let Err(e) = &result {
        log::error!("[cli] {} failed: {:#}", name, e);
    }
    result
}

/// Median of `runs` timings of `f`, in milliseconds.
pub fn time_ms(runs: usize, mut f: impl FnMut()) -> f64 {
    let mut samples: Vec<f64> = (0..runs.max(1))
        .map(|_| {
            let t = std::time::Instant::now();
            f();
            t.elapsed().as_secs_f64() * 1000.0
        })
        .collect();
    samples.sort_by(|a, b| a.total_cmp(b));
    samples[samples.len() / 2]
}

pub fn gflops(m: usize, n: usize, k: usize, ms: f64) -> f64 {
    if ms <= 0.0 {
        return 0.0;
    }
    2.0 * (m * n * k) as f64 / (ms * 1e6)
}
