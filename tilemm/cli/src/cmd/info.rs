use anyhow::Result;
use clap::Args;

use tilemm_core::{capabilities, RuntimeConfig};
use tilemm_gemm::{dispatcher, Dispatcher};
use tilemm_quant::FusedKernels;
use tilemm_sched::WorkerPool;

#[derive(Args)]
pub struct InfoArgs {
    /// Show the scalar-only table instead of the detected one.
    #[arg(long)]
    scalar: bool,
}

pub fn run(args: InfoArgs) -> Result<()> {
    let config = RuntimeConfig::from_env()?;
    config.apply()?;

    let caps = capabilities();
    println!("capabilities: {}", caps.summary());
    println!("simd level:   {}", caps.simd_level());
    println!("tile unit:    {}", if caps.has_tile_unit() { "yes" } else { "no" });

    let scalar;
    let d = if args.scalar {
        scalar = Dispatcher::scalar();
        &scalar
    } else {
        dispatcher()
    };
    let stages: Vec<String> = d.stages().iter().map(|s| s.to_string()).collect();
    let stages = if stages.is_empty() { "none".to_string() } else { stages.join(" -> ") };
    println!("stages:       {}", stages);
    println!("scalar only:  {}", d.is_scalar_only());
    println!();
    print!("{}", d.describe());
    println!("f32 fused        {:?}", FusedKernels::bind(d).matmul);
    println!();
    println!("workers:      {}", WorkerPool::from_config().parallelism());
    println!(
        "thresholds:   parallel {} | tile_min_dim {} | block {}",
        config.parallel_threshold, config.tile_min_dim, config.block_size
    );
    Ok(())
}
