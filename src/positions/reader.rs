use alloy::primitives::{Address, U256};

use crate::chain::ChainClient;
use crate::chain::contracts::{ICLGauge, INonfungiblePositionManager};
use crate::error::KeeperError;
use crate::math::tick::TickRange;
use crate::positions::Position;

/// Structural gauge metadata, read once and held for the process lifetime.
#[derive(Debug, Clone, Copy)]
pub struct GaugeInfo {
    pub address: Address,
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
    pub reward_token: Address,
}

pub async fn load_gauges(
    client: &ChainClient,
    gauges: &[Address],
) -> Result<Vec<GaugeInfo>, KeeperError> {
    let mut out = Vec::with_capacity(gauges.len());
    for &address in gauges {
        let gauge = ICLGauge::new(address, client.provider());
        let (pool, token0, token1, reward_token) = tokio::try_join!(
            client.read("gauge.pool", || async { gauge.pool().call().await }),
            client.read("gauge.token0", || async { gauge.token0().call().await }),
            client.read("gauge.token1", || async { gauge.token1().call().await }),
            client.read("gauge.rewardToken", || async { gauge.rewardToken().call().await }),
        )?;
        out.push(GaugeInfo {
            address,
            pool,
            token0,
            token1,
            reward_token,
        });
    }
    Ok(out)
}

/// All open positions the account controls: unstaked NFTs held directly at
/// the position manager plus staked ones custodied by each gauge.
/// Zero-liquidity positions are burned-or-empty receipts and are dropped.
pub async fn enumerate_positions(
    client: &ChainClient,
    position_manager: Address,
    gauges: &[GaugeInfo],
) -> Result<Vec<Position>, KeeperError> {
    let account = client.account();
    let pm = INonfungiblePositionManager::new(position_manager, client.provider());

    let mut found: Vec<(U256, Option<Address>)> = Vec::new();

    let wallet_count = client
        .read("pm.balanceOf", || async { pm.balanceOf(account).call().await })
        .await?
        .to::<u64>();
    for index in 0..wallet_count {
        let token_id = client
            .read("pm.tokenOfOwnerByIndex", || async {
                pm.tokenOfOwnerByIndex(account, U256::from(index)).call().await
            })
            .await?;
        found.push((token_id, None));
    }

    for gauge in gauges {
        for token_id in staked_token_ids(client, gauge.address).await? {
            found.push((token_id, Some(gauge.address)));
        }
    }

    let mut positions = Vec::with_capacity(found.len());
    for (token_id, gauge) in found {
        let pos = client
            .read("pm.positions", || async { pm.positions(token_id).call().await })
            .await?;
        if pos.liquidity == 0 {
            continue;
        }
        positions.push(Position {
            token_id,
            manager: position_manager,
            token0: pos.token0,
            token1: pos.token1,
            tick_spacing: pos.tickSpacing.as_i32(),
            range: TickRange {
                lower: pos.tickLower.as_i32(),
                upper: pos.tickUpper.as_i32(),
            },
            liquidity: pos.liquidity,
            tokens_owed0: pos.tokensOwed0,
            tokens_owed1: pos.tokensOwed1,
            gauge,
        });
    }
    Ok(positions)
}

/// Staked token IDs for the account. The bulk accessor is preferred; older
/// gauge deployments only expose the length/index pair, so fall back to
/// walking the set when the bulk call errors.
async fn staked_token_ids(
    client: &ChainClient,
    gauge_address: Address,
) -> Result<Vec<U256>, KeeperError> {
    let account = client.account();
    let gauge = ICLGauge::new(gauge_address, client.provider());

    match client
        .read("gauge.stakedValues", || async { gauge.stakedValues(account).call().await })
        .await
    {
        Ok(ids) => return Ok(ids),
        Err(e) => {
            println!("  GAUGE: stakedValues unavailable ({e}), walking the staked set");
        }
    }

    let length = client
        .read("gauge.stakedLength", || async { gauge.stakedLength(account).call().await })
        .await?
        .to::<u64>();
    let mut ids = Vec::with_capacity(length as usize);
    for index in 0..length {
        let id = client
            .read("gauge.stakedByIndex", || async {
                gauge.stakedByIndex(account, U256::from(index)).call().await
            })
            .await?;
        ids.push(id);
    }
    Ok(ids)
}

/// Claimable reward for a staked NFT. Diagnostics only.
pub async fn earned(
    client: &ChainClient,
    gauge_address: Address,
    token_id: U256,
) -> Result<U256, KeeperError> {
    let gauge = ICLGauge::new(gauge_address, client.provider());
    client
        .read("gauge.earned", || async {
            gauge.earned(client.account(), token_id).call().await
        })
        .await
}
