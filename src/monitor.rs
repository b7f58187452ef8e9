use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use alloy::primitives::Address;

use crate::chain::{ChainClient, Slot0};
use crate::config::Config;
use crate::error::KeeperError;
use crate::math::ratio::human_price;
use crate::math::tick::{TickRange, compute_new_range};
use crate::math::to_human;
use crate::positions::reader::{GaugeInfo, earned, enumerate_positions, load_gauges};
use crate::positions::{Position, locator};
use crate::rebalance::{
    Admission, RebalanceDescriptor, Rebalancer, SingleFlight, stake_nft,
};
use crate::swap::SwapExecutor;

/// One position classified against its pool's current tick.
#[derive(Debug, Clone)]
pub struct PositionStatus {
    pub position: Position,
    pub pool: Address,
    pub slot0: Slot0,
    pub in_range: bool,
    pub percent_out: f64,
}

/// Distance outside the range, as a percentage of the range width, on the
/// violated side. Zero when in range.
pub fn percent_out(range: TickRange, tick: i32) -> f64 {
    if range.contains(tick) {
        return 0.0;
    }
    let width = range.width() as f64;
    if tick < range.lower {
        (range.lower - tick) as f64 / width * 100.0
    } else {
        (tick - range.upper) as f64 / width * 100.0
    }
}

/// Per-cycle scanner and dispatcher: reads positions, classifies them, and
/// hands candidates to the state machine.
pub struct Monitor {
    gauges: Option<Vec<GaugeInfo>>,
}

impl Monitor {
    pub fn new() -> Self {
        Monitor { gauges: None }
    }

    /// Gauge structural fields are read once and kept for the process
    /// lifetime.
    async fn gauges(
        &mut self,
        chain: &ChainClient,
        config: &Config,
    ) -> Result<&[GaugeInfo], KeeperError> {
        if self.gauges.is_none() {
            self.gauges = Some(load_gauges(chain, &config.gauges).await?);
        }
        Ok(self.gauges.as_deref().unwrap_or(&[]))
    }

    fn gauge_for_pair(&self, token0: Address, token1: Address) -> Option<&GaugeInfo> {
        self.gauges.as_deref().unwrap_or(&[]).iter().find(|g| {
            (g.token0 == token0 && g.token1 == token1)
                || (g.token0 == token1 && g.token1 == token0)
        })
    }

    /// Enumerate and classify every open position the account controls.
    pub async fn scan(
        &mut self,
        chain: &mut ChainClient,
        config: &Config,
    ) -> Result<Vec<PositionStatus>, KeeperError> {
        let gauges = self.gauges(chain, config).await?.to_vec();
        let positions =
            enumerate_positions(chain, config.position_manager, &gauges).await?;

        let mut statuses = Vec::with_capacity(positions.len());
        let mut slot0_by_pool: HashMap<Address, Slot0> = HashMap::new();

        for position in positions {
            // Pool resolution: a gauge serving the pair knows its pool;
            // otherwise scan the configured factories.
            let pool = match gauges
                .iter()
                .find(|g| position.pair_matches(g.token0, g.token1))
            {
                Some(gauge) => gauge.pool,
                None => {
                    match locator::find_pool(
                        chain,
                        &config.factories,
                        &config.fee_tiers,
                        position.token0,
                        position.token1,
                    )
                    .await?
                    {
                        Some(pool) => pool,
                        None => {
                            println!(
                                "  SCAN: no pool found for position {} ({}/{}), skipping this cycle",
                                position.token_id, position.token0, position.token1
                            );
                            continue;
                        }
                    }
                }
            };

            let slot0 = match slot0_by_pool.get(&pool) {
                Some(slot0) => *slot0,
                None => {
                    let slot0 = chain.slot0(pool).await?;
                    slot0_by_pool.insert(pool, slot0);
                    slot0
                }
            };

            let in_range = position.range.contains(slot0.tick);
            statuses.push(PositionStatus {
                percent_out: percent_out(position.range, slot0.tick),
                position,
                pool,
                slot0,
                in_range,
            });
        }
        Ok(statuses)
    }

    /// Print the scan report, including claimable gauge rewards for staked
    /// positions. Read-only.
    pub async fn report(
        &mut self,
        chain: &mut ChainClient,
        statuses: &[PositionStatus],
    ) -> Result<(), KeeperError> {
        if statuses.is_empty() {
            println!("  SCAN: no open positions");
            return Ok(());
        }
        for status in statuses {
            let meta0 = chain.token_meta(status.position.token0).await?;
            let meta1 = chain.token_meta(status.position.token1).await?;
            let price = human_price(status.slot0.tick, meta0.decimals, meta1.decimals);
            println!(
                "  SCAN: #{} {}/{} {} tick {} — {} (drift {:.1}%, price {:.6}){}",
                status.position.token_id,
                meta0.symbol,
                meta1.symbol,
                status.position.range,
                status.slot0.tick,
                if status.in_range { "in range" } else { "OUT OF RANGE" },
                status.percent_out,
                price,
                if status.position.is_staked() { " [staked]" } else { "" },
            );
            if let Some(gauge_address) = status.position.gauge {
                let claimable = earned(chain, gauge_address, status.position.token_id).await?;
                if let Some(gauge) = self
                    .gauges
                    .as_deref()
                    .unwrap_or(&[])
                    .iter()
                    .find(|g| g.address == gauge_address)
                {
                    let reward_meta = chain.token_meta(gauge.reward_token).await?;
                    println!(
                        "  SCAN:   claimable {} {}",
                        to_human(claimable, reward_meta.decimals),
                        reward_meta.symbol
                    );
                }
            }
        }
        Ok(())
    }

    /// One full keeper cycle: scan, report, auto-stake, rebalance the most
    /// drifted candidate, or bootstrap an empty wallet.
    pub async fn run_cycle(
        &mut self,
        chain: &mut ChainClient,
        config: &Config,
        swapper: &dyn SwapExecutor,
        flight: &mut SingleFlight,
        shutdown: &AtomicBool,
    ) -> Result<(), KeeperError> {
        let statuses = self.scan(chain, config).await?;
        self.report(chain, &statuses).await?;

        // Auto-stake: in range, unstaked, and a gauge serves the pair.
        // Idempotent — a second pass with no chain change sends nothing.
        for status in &statuses {
            if shutdown.load(Ordering::Relaxed) {
                return Err(KeeperError::Cancelled);
            }
            if !status.in_range || status.position.is_staked() {
                continue;
            }
            let Some(gauge) = self
                .gauge_for_pair(status.position.token0, status.position.token1)
                .map(|g| g.address)
            else {
                continue;
            };
            println!(
                "  STAKE: position {} is in range and unstaked, depositing to {gauge}",
                status.position.token_id
            );
            match stake_nft(chain, status.position.manager, gauge, status.position.token_id)
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => println!("  STAKE: failed for {}: {e}", status.position.token_id),
            }
        }

        // Rebalance: the most drifted qualifying candidate, one per cycle.
        let candidate = statuses
            .iter()
            .filter(|s| !s.in_range && s.percent_out >= config.rebalance_threshold)
            .max_by(|a, b| a.percent_out.total_cmp(&b.percent_out));
        if let Some(status) = candidate {
            if !config.auto_rebalance {
                println!(
                    "  REBALANCE: position {} drifted {:.1}% but AUTO_REBALANCE is off",
                    status.position.token_id, status.percent_out
                );
            } else {
                match flight.try_begin() {
                    Admission::Skipped => {
                        println!("  REBALANCE: skipping, another rebalance is in flight");
                    }
                    Admission::Started => {
                        let result = self
                            .rebalance(chain, config, swapper, shutdown, status)
                            .await;
                        flight.finish();
                        result?;
                    }
                }
            }
            return Ok(());
        }

        // Bootstrap: nothing on chain, but the wallet may hold the pair.
        if statuses.is_empty() {
            if let (Some(token0), Some(token1)) = (config.token0, config.token1) {
                match flight.try_begin() {
                    Admission::Skipped => {
                        println!("  BOOTSTRAP: skipping, a rebalance is in flight");
                    }
                    Admission::Started => {
                        let result = self
                            .bootstrap(chain, config, swapper, shutdown, token0, token1)
                            .await;
                        flight.finish();
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn rebalance(
        &mut self,
        chain: &mut ChainClient,
        config: &Config,
        swapper: &dyn SwapExecutor,
        shutdown: &AtomicBool,
        status: &PositionStatus,
    ) -> Result<(), KeeperError> {
        let target = compute_new_range(
            status.slot0.tick,
            status.position.tick_spacing,
            config.range_multiplier,
        )?;
        println!(
            "  REBALANCE: migrating {} from {} to {} (drift {:.1}%)",
            status.position.token_id, status.position.range, target, status.percent_out
        );
        let gauge = self
            .gauge_for_pair(status.position.token0, status.position.token1)
            .map(|g| g.address);
        let mut descriptor =
            RebalanceDescriptor::migrate(status.position.clone(), status.pool, target, gauge);
        let mut rebalancer = Rebalancer {
            chain,
            config,
            swapper,
            shutdown,
        };
        match rebalancer.run(&mut descriptor).await {
            Ok(()) => Ok(()),
            Err(e) => {
                println!(
                    "  REBALANCE: failed at {e} (txs so far: {})",
                    descriptor.tx_summary()
                );
                Err(e)
            }
        }
    }

    /// Create-then-stake from wallet balances. Uses the same machine from
    /// the ratio stage on; below the dust floor it does nothing, so a
    /// repeat cycle with an empty wallet sends zero transactions.
    async fn bootstrap(
        &mut self,
        chain: &mut ChainClient,
        config: &Config,
        swapper: &dyn SwapExecutor,
        shutdown: &AtomicBool,
        token0: Address,
        token1: Address,
    ) -> Result<(), KeeperError> {
        let Some(pool) = locator::find_pool(
            chain,
            &config.factories,
            &config.fee_tiers,
            token0,
            token1,
        )
        .await?
        else {
            println!("  BOOTSTRAP: no pool for the configured pair, skipping");
            return Ok(());
        };
        // The pool's own ordering is authoritative for mint parameters.
        let pool_meta = chain.pool_meta(pool).await?;
        let (token0, token1) = (pool_meta.token0, pool_meta.token1);

        let account = chain.account();
        let (balance0, balance1) = {
            let chain = &*chain;
            tokio::try_join!(
                chain.balance_of(token0, account),
                chain.balance_of(token1, account),
            )?
        };
        let meta0 = chain.token_meta(token0).await?;
        let meta1 = chain.token_meta(token1).await?;
        let slot0 = chain.slot0(pool).await?;

        let price = human_price(slot0.tick, meta0.decimals, meta1.decimals);
        let total_value =
            to_human(balance0, meta0.decimals) * price + to_human(balance1, meta1.decimals);
        if total_value < config.min_swap_value_usdc {
            println!(
                "  BOOTSTRAP: wallet value {total_value:.2} is below the {} dust floor, nothing to do",
                config.min_swap_value_usdc
            );
            return Ok(());
        }

        let target = compute_new_range(slot0.tick, pool_meta.tick_spacing, config.range_multiplier)?;
        println!(
            "  BOOTSTRAP: creating position in {target} from {:.2} {} / {:.2} {}",
            to_human(balance0, meta0.decimals),
            meta0.symbol,
            to_human(balance1, meta1.decimals),
            meta1.symbol
        );
        let gauge = self.gauge_for_pair(token0, token1).map(|g| g.address);
        let mut descriptor = RebalanceDescriptor::bootstrap(
            pool,
            token0,
            token1,
            pool_meta.tick_spacing,
            target,
            gauge,
            balance0,
            balance1,
        );
        let mut rebalancer = Rebalancer {
            chain,
            config,
            swapper,
            shutdown,
        };
        match rebalancer.run(&mut descriptor).await {
            Ok(()) => Ok(()),
            Err(e) => {
                println!(
                    "  BOOTSTRAP: failed at {e} (txs so far: {})",
                    descriptor.tx_summary()
                );
                Err(e)
            }
        }
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Monitor::new()
    }
}
