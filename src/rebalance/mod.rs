use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Signed, TxHash, U256, Uint};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::sol_types::SolCall;

use crate::chain::client::gas_fee_wei;
use crate::chain::contracts::{ICLGauge, INonfungiblePositionManager};
use crate::chain::{ChainClient, Slot0};
use crate::config::Config;
use crate::error::{KeeperError, revert_reason};
use crate::math::ratio::RatioResult;
use crate::math::tick::{TickRange, sqrt_price_from_x96};
use crate::math::{to_human, to_raw};
use crate::positions::Position;
use crate::swap::{SwapExecutor, SwapRequest, amount_out_minimum};

/// Where a migration currently stands. The stage is always set before the
/// action it names begins: an interruption at stage X means "X may or may
/// not have happened", and the next cycle re-derives the truth from chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Starting,
    Unstaking,
    Withdrawing,
    ReadingBalances,
    ComputingRatio,
    Swapping,
    Minting,
    Staking,
    Done,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Starting => "Starting",
            Stage::Unstaking => "Unstaking",
            Stage::Withdrawing => "Withdrawing",
            Stage::ReadingBalances => "ReadingBalances",
            Stage::ComputingRatio => "ComputingRatio",
            Stage::Swapping => "Swapping",
            Stage::Minting => "Minting",
            Stage::Staking => "Staking",
            Stage::Done => "Done",
        }
    }
}

/// Working memory for one migration. At most one of these is alive at a
/// time — see `SingleFlight`.
#[derive(Debug)]
pub struct RebalanceDescriptor {
    pub stage: Stage,
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
    pub tick_spacing: i32,
    pub target: TickRange,
    /// Snapshot of the position being dismantled. Absent for bootstrap.
    pub source: Option<Position>,
    /// Gauge to stake the new position into, when one serves this pool.
    pub gauge: Option<Address>,
    pub balance0: U256,
    pub balance1: U256,
    pub ratio: Option<RatioResult>,
    pub captured_slot0: Option<Slot0>,
    pub minted_token_id: Option<U256>,
    pub tx_hashes: Vec<(Stage, TxHash)>,
    pub gas_spent_wei: u128,
}

impl RebalanceDescriptor {
    /// Full migration of an existing position into `target`.
    pub fn migrate(
        source: Position,
        pool: Address,
        target: TickRange,
        gauge: Option<Address>,
    ) -> Self {
        RebalanceDescriptor {
            stage: Stage::Starting,
            pool,
            token0: source.token0,
            token1: source.token1,
            tick_spacing: source.tick_spacing,
            target,
            gauge,
            source: Some(source),
            balance0: U256::ZERO,
            balance1: U256::ZERO,
            ratio: None,
            captured_slot0: None,
            minted_token_id: None,
            tx_hashes: Vec::new(),
            gas_spent_wei: 0,
        }
    }

    /// Create-then-stake from wallet balances: a degenerate entry into the
    /// same machine with nothing to unstake or withdraw.
    #[allow(clippy::too_many_arguments)]
    pub fn bootstrap(
        pool: Address,
        token0: Address,
        token1: Address,
        tick_spacing: i32,
        target: TickRange,
        gauge: Option<Address>,
        balance0: U256,
        balance1: U256,
    ) -> Self {
        RebalanceDescriptor {
            stage: Stage::ComputingRatio,
            pool,
            token0,
            token1,
            tick_spacing,
            target,
            gauge,
            source: None,
            balance0,
            balance1,
            ratio: None,
            captured_slot0: None,
            minted_token_id: None,
            tx_hashes: Vec::new(),
            gas_spent_wei: 0,
        }
    }

    fn record(&mut self, stage: Stage, hash: TxHash) {
        self.tx_hashes.push((stage, hash));
    }

    /// Hashes observed so far, for failure diagnostics.
    pub fn tx_summary(&self) -> String {
        if self.tx_hashes.is_empty() {
            return "none".to_string();
        }
        self.tx_hashes
            .iter()
            .map(|(stage, hash)| format!("{}:{hash:?}", stage.name()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Serializes rebalances: the orchestrator owns one of these and a second
/// trigger observes `Skipped` while a descriptor is alive.
#[derive(Debug, Default)]
pub struct SingleFlight {
    active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Started,
    Skipped,
}

impl SingleFlight {
    pub fn try_begin(&mut self) -> Admission {
        if self.active {
            Admission::Skipped
        } else {
            self.active = true;
            Admission::Started
        }
    }

    pub fn finish(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

// ── Swap plan ──────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum SwapPlan {
    Skip(SkipReason),
    SellToken0 { amount_in: U256 },
    SellToken1 { amount_in: U256 },
}

#[derive(Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The imbalance is below the configured minimum swap value.
    Dust,
    /// The side to sell holds nothing.
    NothingToSell,
}

/// Decide what to swap so the wallet matches the target range's ratio.
/// Out-of-range targets need one side only; in-range targets move the
/// value delta (in token1 units) from the excess side to the scarce side.
pub fn compute_swap_plan(
    ratio: &RatioResult,
    balance0: U256,
    balance1: U256,
    dec0: u8,
    dec1: u8,
    price: f64,
    min_swap_value: f64,
) -> SwapPlan {
    if !ratio.in_range {
        return if ratio.below_range {
            if balance1.is_zero() {
                SwapPlan::Skip(SkipReason::NothingToSell)
            } else {
                SwapPlan::SellToken1 { amount_in: balance1 }
            }
        } else if balance0.is_zero() {
            SwapPlan::Skip(SkipReason::NothingToSell)
        } else {
            SwapPlan::SellToken0 { amount_in: balance0 }
        };
    }

    let bal0 = to_human(balance0, dec0);
    let bal1 = to_human(balance1, dec1);
    let total_value = bal0 * price + bal1;
    let target0_value = total_value * ratio.token0_ratio;
    let current0_value = bal0 * price;
    let delta = current0_value - target0_value;

    if delta.abs() < min_swap_value {
        return SwapPlan::Skip(SkipReason::Dust);
    }
    if delta > 0.0 {
        let amount0 = (delta / price).min(bal0);
        SwapPlan::SellToken0 {
            amount_in: to_raw(amount0, dec0).min(balance0),
        }
    } else {
        let amount1 = (-delta).min(bal1);
        SwapPlan::SellToken1 {
            amount_in: to_raw(amount1, dec1).min(balance1),
        }
    }
}

// ── State machine driver ───────────────────────────────────────────

/// Drives one descriptor through its stages against live chain state.
pub struct Rebalancer<'a> {
    pub chain: &'a mut ChainClient,
    pub config: &'a Config,
    pub swapper: &'a dyn SwapExecutor,
    pub shutdown: &'a AtomicBool,
}

impl Rebalancer<'_> {
    /// Run the descriptor to `Done` or fail at a named stage. The caller
    /// keeps the descriptor either way; its tx hashes are the diagnostic.
    pub async fn run(&mut self, descriptor: &mut RebalanceDescriptor) -> Result<(), KeeperError> {
        loop {
            self.check_cancelled()?;
            let stage = descriptor.stage;
            let step = match stage {
                Stage::Starting => {
                    descriptor.stage = match &descriptor.source {
                        Some(position) if position.is_staked() => Stage::Unstaking,
                        _ => Stage::Withdrawing,
                    };
                    Ok(())
                }
                Stage::Unstaking => self.unstake(descriptor).await,
                Stage::Withdrawing => self.withdraw(descriptor).await,
                Stage::ReadingBalances => self.read_balances(descriptor).await,
                Stage::ComputingRatio => self.compute_ratio(descriptor).await,
                Stage::Swapping => self.swap(descriptor).await,
                Stage::Minting => self.mint(descriptor).await,
                Stage::Staking => self.stake(descriptor).await,
                Stage::Done => {
                    println!(
                        "  REBALANCE: done — position {} in {} (txs: {})",
                        descriptor
                            .minted_token_id
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| "?".into()),
                        descriptor.target,
                        descriptor.tx_summary()
                    );
                    return Ok(());
                }
            };
            if let Err(e) = step {
                let wrapped = match e {
                    wrapped @ KeeperError::Stage { .. } => wrapped,
                    other => other.at_stage(stage.name()),
                };
                return Err(wrapped);
            }
        }
    }

    /// Pull the NFT back from the gauge. A failure here is tolerated: the
    /// withdraw may have landed before a transient error, and the next
    /// stage's liquidity call surfaces any real problem.
    async fn unstake(&mut self, d: &mut RebalanceDescriptor) -> Result<(), KeeperError> {
        if let Some((gauge, token_id)) = d
            .source
            .as_ref()
            .and_then(|p| p.gauge.map(|g| (g, p.token_id)))
        {
            println!("  REBALANCE: unstaking {token_id} from gauge {gauge}");
            let data = ICLGauge::withdrawCall { tokenId: token_id }.abi_encode();
            let tx = TransactionRequest::default().with_to(gauge).with_input(data);
            match self.chain.send(tx, "gauge.withdraw").await {
                Ok(receipt) => {
                    d.gas_spent_wei += gas_fee_wei(&receipt);
                    d.record(Stage::Unstaking, receipt.transaction_hash);
                    self.settle(self.config.settle_after_unstake).await?;
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    println!("  REBALANCE: unstake failed ({e}), continuing to withdraw");
                }
            }
        }
        d.stage = Stage::Withdrawing;
        Ok(())
    }

    /// Dismantle the old position atomically: decrease all liquidity,
    /// collect everything owed, burn the receipt.
    async fn withdraw(&mut self, d: &mut RebalanceDescriptor) -> Result<(), KeeperError> {
        let Some(position) = d.source.clone() else {
            d.stage = Stage::ReadingBalances;
            return Ok(());
        };
        println!(
            "  REBALANCE: withdrawing {} (liquidity {})",
            position.token_id, position.liquidity
        );
        let deadline = U256::from(chrono::Utc::now().timestamp() as u64 + 300);
        let decrease = INonfungiblePositionManager::decreaseLiquidityCall {
            params: INonfungiblePositionManager::DecreaseLiquidityParams {
                tokenId: position.token_id,
                liquidity: position.liquidity,
                amount0Min: U256::ZERO,
                amount1Min: U256::ZERO,
                deadline,
            },
        }
        .abi_encode();
        let collect = INonfungiblePositionManager::collectCall {
            params: INonfungiblePositionManager::CollectParams {
                tokenId: position.token_id,
                recipient: self.chain.account(),
                amount0Max: u128::MAX,
                amount1Max: u128::MAX,
            },
        }
        .abi_encode();
        let burn = INonfungiblePositionManager::burnCall {
            tokenId: position.token_id,
        }
        .abi_encode();
        let data = INonfungiblePositionManager::multicallCall {
            data: vec![decrease.into(), collect.into(), burn.into()],
        }
        .abi_encode();
        let tx = TransactionRequest::default()
            .with_to(position.manager)
            .with_input(data);
        let receipt = self.chain.send(tx, "pm.withdraw").await?;
        d.gas_spent_wei += gas_fee_wei(&receipt);
        d.record(Stage::Withdrawing, receipt.transaction_hash);
        self.settle(self.config.settle_after_withdraw).await?;
        d.stage = Stage::ReadingBalances;
        Ok(())
    }

    async fn read_balances(&mut self, d: &mut RebalanceDescriptor) -> Result<(), KeeperError> {
        let account = self.chain.account();
        let (balance0, balance1) = {
            let chain = &*self.chain;
            tokio::try_join!(
                chain.balance_of(d.token0, account),
                chain.balance_of(d.token1, account),
            )?
        };
        let meta0 = self.chain.token_meta(d.token0).await?;
        let meta1 = self.chain.token_meta(d.token1).await?;
        d.balance0 = balance0;
        d.balance1 = balance1;
        println!(
            "  REBALANCE: wallet holds {} {} and {} {}",
            to_human(balance0, meta0.decimals),
            meta0.symbol,
            to_human(balance1, meta1.decimals),
            meta1.symbol
        );
        d.stage = Stage::ComputingRatio;
        Ok(())
    }

    async fn compute_ratio(&mut self, d: &mut RebalanceDescriptor) -> Result<(), KeeperError> {
        let slot0 = self.chain.slot0(d.pool).await?;
        let meta0 = self.chain.token_meta(d.token0).await?;
        let meta1 = self.chain.token_meta(d.token1).await?;
        let ratio = crate::math::ratio::ratio_for_range(
            slot0.tick,
            Some(slot0.sqrt_price_x96),
            d.target,
            meta0.decimals,
            meta1.decimals,
        );
        println!(
            "  REBALANCE: tick {} vs target {} — {} (token0 {:.1}% / token1 {:.1}%)",
            slot0.tick,
            d.target,
            if ratio.in_range {
                "in range"
            } else if ratio.below_range {
                "below range"
            } else {
                "above range"
            },
            ratio.token0_ratio * 100.0,
            ratio.token1_ratio * 100.0
        );
        d.ratio = Some(ratio);
        d.captured_slot0 = Some(slot0);
        d.stage = Stage::Swapping;
        Ok(())
    }

    async fn swap(&mut self, d: &mut RebalanceDescriptor) -> Result<(), KeeperError> {
        let (Some(ratio), Some(slot0)) = (d.ratio, d.captured_slot0) else {
            return Err(KeeperError::InvalidRange(
                "swap stage reached without a computed ratio".into(),
            ));
        };
        let meta0 = self.chain.token_meta(d.token0).await?;
        let meta1 = self.chain.token_meta(d.token1).await?;
        let sqrt_price = sqrt_price_from_x96(slot0.sqrt_price_x96);
        let price =
            sqrt_price * sqrt_price * 10f64.powi(meta0.decimals as i32 - meta1.decimals as i32);

        let plan = compute_swap_plan(
            &ratio,
            d.balance0,
            d.balance1,
            meta0.decimals,
            meta1.decimals,
            price,
            self.config.min_swap_value_usdc,
        );
        let request = match plan {
            SwapPlan::Skip(SkipReason::Dust) => {
                println!(
                    "  SWAP: imbalance below ${} threshold, keeping wallet amounts",
                    self.config.min_swap_value_usdc
                );
                d.stage = Stage::Minting;
                return Ok(());
            }
            SwapPlan::Skip(SkipReason::NothingToSell) => {
                println!("  SWAP: nothing to sell on the excess side");
                d.stage = Stage::Minting;
                return Ok(());
            }
            SwapPlan::SellToken0 { amount_in } => SwapRequest {
                token_in: d.token0,
                token_out: d.token1,
                amount_in,
                pool_hint: Some(d.pool),
            },
            SwapPlan::SellToken1 { amount_in } => SwapRequest {
                token_in: d.token1,
                token_out: d.token0,
                amount_in,
                pool_hint: Some(d.pool),
            },
        };

        println!(
            "  SWAP: selling {} of {} for {} via {}",
            request.amount_in,
            request.token_in,
            request.token_out,
            self.swapper.name()
        );
        match self.swapper.swap(self.chain, &request).await {
            Ok(Some(receipt)) => {
                d.gas_spent_wei += receipt.gas_fee_wei;
                d.record(Stage::Swapping, receipt.tx_hash);
                self.settle(self.config.settle_after_swap).await?;
                // Re-read both balances; the mint uses what actually landed.
                let account = self.chain.account();
                let chain = &*self.chain;
                let (balance0, balance1) = tokio::try_join!(
                    chain.balance_of(d.token0, account),
                    chain.balance_of(d.token1, account),
                )?;
                d.balance0 = balance0;
                d.balance1 = balance1;
            }
            Ok(None) => {}
            Err(e) => return Err(e),
        }
        d.stage = Stage::Minting;
        Ok(())
    }

    /// Mint the new position from whatever the wallet now holds. Never
    /// auto-retried: a failure leaves the swapped tokens in the wallet,
    /// which the next cycle's bootstrap picks up.
    async fn mint(&mut self, d: &mut RebalanceDescriptor) -> Result<(), KeeperError> {
        let account = self.chain.account();
        let manager = d
            .source
            .as_ref()
            .map(|p| p.manager)
            .unwrap_or(self.config.position_manager);

        self.chain.approve_exact(d.token0, manager, d.balance0).await?;
        self.chain.approve_exact(d.token1, manager, d.balance1).await?;

        let deadline = U256::from(chrono::Utc::now().timestamp() as u64 + 300);
        let params = INonfungiblePositionManager::MintParams {
            token0: d.token0,
            token1: d.token1,
            tickSpacing: i24(d.tick_spacing)?,
            tickLower: i24(d.target.lower)?,
            tickUpper: i24(d.target.upper)?,
            amount0Desired: d.balance0,
            amount1Desired: d.balance1,
            amount0Min: amount_out_minimum(d.balance0, self.config.slippage_bps),
            amount1Min: amount_out_minimum(d.balance1, self.config.slippage_bps),
            recipient: account,
            deadline,
            sqrtPriceX96: Uint::<160, 3>::ZERO,
        };
        println!(
            "  MINT: range {} amounts ({}, {}) mins ({}, {})",
            d.target, params.amount0Desired, params.amount1Desired, params.amount0Min,
            params.amount1Min
        );
        let data = INonfungiblePositionManager::mintCall { params }.abi_encode();
        let tx = TransactionRequest::default()
            .with_to(manager)
            .with_input(data);

        // Simulate first so the revert reason is visible before spending gas.
        if let Err(e) = self.chain.static_call(tx.clone(), "pm.mint.simulate").await {
            return Err(match e {
                KeeperError::RpcTransient { ref message, .. }
                    if message.contains("execution reverted") =>
                {
                    KeeperError::MintReverted {
                        reason: revert_reason(message),
                    }
                }
                other => other,
            });
        }

        let receipt = match self.chain.send(tx, "pm.mint").await {
            Ok(receipt) => receipt,
            Err(KeeperError::TxReverted { hash, .. }) => {
                return Err(KeeperError::MintReverted {
                    reason: format!("mint reverted on-chain ({hash:?})"),
                });
            }
            Err(other) => return Err(other),
        };
        d.gas_spent_wei += gas_fee_wei(&receipt);
        d.record(Stage::Minting, receipt.transaction_hash);

        let token_id =
            parse_minted_token_id(&receipt).ok_or(KeeperError::EventNotFound {
                event: "IncreaseLiquidity",
                hash: receipt.transaction_hash,
            })?;
        println!("  MINT: new position {token_id}");
        d.minted_token_id = Some(token_id);
        d.stage = if d.gauge.is_some() {
            Stage::Staking
        } else {
            Stage::Done
        };
        Ok(())
    }

    /// Stake the fresh NFT. A failure still ends at Done: the position
    /// exists and earns fees even unstaked.
    async fn stake(&mut self, d: &mut RebalanceDescriptor) -> Result<(), KeeperError> {
        if let (Some(gauge), Some(token_id)) = (d.gauge, d.minted_token_id) {
            let manager = d
                .source
                .as_ref()
                .map(|p| p.manager)
                .unwrap_or(self.config.position_manager);
            match stake_nft(self.chain, manager, gauge, token_id).await {
                Ok(hash) => d.record(Stage::Staking, hash),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    println!("  REBALANCE: staking failed ({e}); {token_id} stays unstaked");
                }
            }
        }
        d.stage = Stage::Done;
        Ok(())
    }

    /// Post-confirmation settle between stages; absorbs RPC state
    /// propagation so the next read sees the previous write.
    async fn settle(&self, duration: Duration) -> Result<(), KeeperError> {
        tokio::time::sleep(duration).await;
        self.check_cancelled()
    }

    fn check_cancelled(&self) -> Result<(), KeeperError> {
        if self.shutdown.load(Ordering::Relaxed) {
            Err(KeeperError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Approve (idempotently) and deposit an NFT into its gauge. Shared by the
/// Staking stage and the monitor's auto-stake path.
pub async fn stake_nft(
    chain: &mut ChainClient,
    position_manager: Address,
    gauge: Address,
    token_id: U256,
) -> Result<TxHash, KeeperError> {
    let pm = INonfungiblePositionManager::new(position_manager, chain.provider());
    let approved = chain
        .read("pm.getApproved", || async { pm.getApproved(token_id).call().await })
        .await?;
    if approved != gauge {
        let data = INonfungiblePositionManager::approveCall {
            to: gauge,
            tokenId: token_id,
        }
        .abi_encode();
        let tx = TransactionRequest::default()
            .with_to(position_manager)
            .with_input(data);
        chain.send(tx, "pm.approveNft").await?;
    }
    let data = ICLGauge::depositCall { tokenId: token_id }.abi_encode();
    let tx = TransactionRequest::default().with_to(gauge).with_input(data);
    let receipt = chain.send(tx, "gauge.deposit").await?;
    Ok(receipt.transaction_hash)
}

/// New token ID from a mint receipt: IncreaseLiquidity when present, with
/// the ERC-721 mint Transfer as fallback.
pub fn parse_minted_token_id(receipt: &TransactionReceipt) -> Option<U256> {
    for log in receipt.inner.logs() {
        if let Ok(decoded) = log.log_decode::<INonfungiblePositionManager::IncreaseLiquidity>() {
            return Some(decoded.inner.data.tokenId);
        }
    }
    for log in receipt.inner.logs() {
        if let Ok(decoded) = log.log_decode::<INonfungiblePositionManager::Transfer>() {
            if decoded.inner.data.from == Address::ZERO {
                return Some(decoded.inner.data.tokenId);
            }
        }
    }
    None
}

fn i24(value: i32) -> Result<Signed<24, 1>, KeeperError> {
    Signed::<24, 1>::try_from(value)
        .map_err(|_| KeeperError::InvalidRange(format!("tick {value} does not fit int24")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_flight_admits_one() {
        let mut flight = SingleFlight::default();
        assert_eq!(flight.try_begin(), Admission::Started);
        assert_eq!(flight.try_begin(), Admission::Skipped);
        assert_eq!(flight.try_begin(), Admission::Skipped);
        flight.finish();
        assert_eq!(flight.try_begin(), Admission::Started);
    }

    fn in_range_ratio(token0_ratio: f64) -> RatioResult {
        RatioResult {
            token0_ratio,
            token1_ratio: 1.0 - token0_ratio,
            in_range: true,
            below_range: false,
        }
    }

    #[test]
    fn below_range_sells_all_token1() {
        let ratio = RatioResult {
            token0_ratio: 1.0,
            token1_ratio: 0.0,
            in_range: false,
            below_range: true,
        };
        let plan = compute_swap_plan(
            &ratio,
            U256::from(5u64),
            U256::from(50_000_000u64),
            9,
            6,
            1000.0,
            20.0,
        );
        assert_eq!(
            plan,
            SwapPlan::SellToken1 {
                amount_in: U256::from(50_000_000u64)
            }
        );
    }

    #[test]
    fn above_range_sells_all_token0() {
        let ratio = RatioResult {
            token0_ratio: 0.0,
            token1_ratio: 1.0,
            in_range: false,
            below_range: false,
        };
        let plan = compute_swap_plan(
            &ratio,
            U256::from(1_234_500_000u64),
            U256::ZERO,
            9,
            6,
            1000.0,
            20.0,
        );
        assert_eq!(
            plan,
            SwapPlan::SellToken0 {
                amount_in: U256::from(1_234_500_000u64)
            }
        );
    }

    #[test]
    fn out_of_range_with_empty_side_skips() {
        let ratio = RatioResult {
            token0_ratio: 1.0,
            token1_ratio: 0.0,
            in_range: false,
            below_range: true,
        };
        let plan = compute_swap_plan(&ratio, U256::from(5u64), U256::ZERO, 9, 6, 1000.0, 20.0);
        assert_eq!(plan, SwapPlan::Skip(SkipReason::NothingToSell));
    }

    // A $12 imbalance under a $20 floor performs no swap; the mint takes
    // the wallet amounts as read.
    #[test]
    fn dust_imbalance_is_skipped() {
        let plan = compute_swap_plan(
            &in_range_ratio(0.5),
            U256::from(62_000_000u64), // 62.0 at 6 decimals
            U256::from(38_000_000u64), // 38.0
            6,
            6,
            1.0,
            20.0,
        );
        assert_eq!(plan, SwapPlan::Skip(SkipReason::Dust));
    }

    #[test]
    fn imbalance_above_floor_sells_the_excess_side() {
        // Same balances, lower floor: 12.0 of token0 value must move over.
        let plan = compute_swap_plan(
            &in_range_ratio(0.5),
            U256::from(62_000_000u64),
            U256::from(38_000_000u64),
            6,
            6,
            1.0,
            10.0,
        );
        match plan {
            SwapPlan::SellToken0 { amount_in } => {
                let amount = amount_in.to::<u64>();
                assert!((11_999_000..=12_001_000).contains(&amount), "got {amount}");
            }
            other => panic!("expected SellToken0, got {other:?}"),
        }
    }

    #[test]
    fn scarce_token0_buys_with_token1() {
        // token0 worth 10, token1 90; a 50/50 target moves 40 from token1.
        let plan = compute_swap_plan(
            &in_range_ratio(0.5),
            U256::from(10_000_000u64),
            U256::from(90_000_000u64),
            6,
            6,
            1.0,
            20.0,
        );
        match plan {
            SwapPlan::SellToken1 { amount_in } => {
                let amount = amount_in.to::<u64>();
                assert!((39_999_000..=40_001_000).contains(&amount), "got {amount}");
            }
            other => panic!("expected SellToken1, got {other:?}"),
        }
    }

    #[test]
    fn sell_amount_never_exceeds_balance() {
        // token0 heavily over target but priced so the delta implies more
        // than the wallet holds after float noise.
        let plan = compute_swap_plan(
            &in_range_ratio(0.0001),
            U256::from(1_000_000u64),
            U256::ZERO,
            6,
            6,
            1.0,
            0.0,
        );
        match plan {
            SwapPlan::SellToken0 { amount_in } => {
                assert!(amount_in <= U256::from(1_000_000u64));
            }
            other => panic!("expected SellToken0, got {other:?}"),
        }
    }

    #[test]
    fn descriptor_stage_entry_points() {
        let bootstrap = RebalanceDescriptor::bootstrap(
            Address::ZERO,
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            60,
            TickRange { lower: -120, upper: 120 },
            None,
            U256::from(1u64),
            U256::from(1u64),
        );
        assert_eq!(bootstrap.stage, Stage::ComputingRatio);
        assert!(bootstrap.source.is_none());
        assert_eq!(bootstrap.tx_summary(), "none");
    }
}
