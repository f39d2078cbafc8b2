mod cmd;

use anyhow::Result;
use clap::Parser;

/// tilemm: capability report and GEMM benchmarks.
#[derive(Parser)]
#[command(name = "tilemm", version, about)]
struct Cli {
    #[command(subcommand)]
    command: cmd::Command,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    cmd::run(cli.command)
}
