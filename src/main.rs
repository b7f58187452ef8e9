use anyhow::Context;
use clap::Parser;

use range_keeper::cli::{Cli, Command};
use range_keeper::config::Config;
use range_keeper::orchestrator;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Configuration problems are the only fatal startup path; everything
    // after this point survives per-cycle failures.
    let config = Config::from_env()?;

    let rt = tokio::runtime::Runtime::new().context("creating tokio runtime")?;
    match cli.command {
        Command::Run => rt.block_on(orchestrator::run(config))?,
        Command::Scan => rt.block_on(orchestrator::scan_once(config))?,
    }
    Ok(())
}
