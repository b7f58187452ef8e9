use clap::{Parser, Subcommand};

/// Concentrated-liquidity position keeper — keeps one wallet's Slipstream
/// positions centered, staked, and earning.
#[derive(Parser)]
#[command(name = "range-keeper", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the keeper loop: scan, auto-stake, and rebalance on an interval
    Run,

    /// One read-only scan: positions, range status, claimable rewards
    Scan,
}
