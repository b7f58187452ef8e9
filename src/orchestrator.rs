use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::chain::ChainClient;
use crate::config::{Config, SwapVariant};
use crate::error::KeeperError;
use crate::monitor::Monitor;
use crate::rebalance::SingleFlight;
use crate::swap::SwapExecutor;
use crate::swap::aggregator::AggregatorSwap;
use crate::swap::router::RouterSwap;

/// The keeper loop: a periodic, non-overlapping tick that runs one monitor
/// cycle to completion. Owns the chain client (and with it the signer and
/// nonce counter), the single-flight latch, and the shutdown flag.
pub struct Orchestrator {
    config: Config,
    chain: ChainClient,
    monitor: Monitor,
    swapper: Box<dyn SwapExecutor>,
    flight: SingleFlight,
    shutdown: Arc<AtomicBool>,
    check_in_progress: bool,
}

impl Orchestrator {
    pub async fn new(config: Config) -> Result<Self, KeeperError> {
        let chain = ChainClient::connect(&config).await?;
        let swapper: Box<dyn SwapExecutor> = match config.swap_variant {
            SwapVariant::Aggregator => Box::new(AggregatorSwap::new(
                config.aggregator.clone(),
                config.slippage_bps,
            )),
            SwapVariant::Router => {
                // Presence is validated at config load.
                let (Some(router), Some(quoter)) = (config.swap_router, config.quoter) else {
                    return Err(KeeperError::Config(
                        "router swap variant needs SWAP_ROUTER and QUOTER".into(),
                    ));
                };
                Box::new(RouterSwap::new(router, quoter, config.slippage_bps))
            }
        };
        Ok(Orchestrator {
            config,
            chain,
            monitor: Monitor::new(),
            swapper,
            flight: SingleFlight::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
            check_in_progress: false,
        })
    }

    async fn run_loop(mut self) -> Result<(), KeeperError> {
        self.config.print_summary(self.chain.account());

        let notify = Arc::new(Notify::new());
        {
            let shutdown = self.shutdown.clone();
            let notify = notify.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                println!("\nshutdown signal received, finishing current work");
                shutdown.store(true, Ordering::Relaxed);
                notify.notify_waiters();
            });
        }

        let mut interval = tokio::time::interval(self.config.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = notify.notified() => {}
            }
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            if self.check_in_progress {
                // A cycle outliving its period should never overlap the
                // next one; the timer fire is dropped and rescheduled.
                println!(
                    "[{}] previous cycle still running, skipping this fire",
                    chrono::Utc::now().format("%H:%M:%S")
                );
                continue;
            }

            self.check_in_progress = true;
            println!("[{}] cycle start", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"));
            let result = self
                .monitor
                .run_cycle(
                    &mut self.chain,
                    &self.config,
                    self.swapper.as_ref(),
                    &mut self.flight,
                    &self.shutdown,
                )
                .await;
            self.check_in_progress = false;

            match result {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {
                    println!("  cycle cancelled by shutdown");
                    break;
                }
                // A per-cycle failure never exits the process; the next
                // scan re-derives everything from chain state.
                Err(e) => eprintln!("  ERROR: cycle failed: {e}"),
            }

            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
        }
        println!("shutdown complete");
        Ok(())
    }
}

/// Entry point for the `run` subcommand.
pub async fn run(config: Config) -> Result<(), KeeperError> {
    install_crypto_provider();
    let orchestrator = Orchestrator::new(config).await?;
    orchestrator.run_loop().await
}

/// Entry point for the `scan` subcommand: one read-only cycle, then exit.
pub async fn scan_once(config: Config) -> Result<(), KeeperError> {
    install_crypto_provider();
    let mut chain = ChainClient::connect(&config).await?;
    config.print_summary(chain.account());
    let mut monitor = Monitor::new();
    let statuses = monitor.scan(&mut chain, &config).await?;
    monitor.report(&mut chain, &statuses).await?;
    Ok(())
}

/// Required by reqwest's rustls TLS backend.
fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
