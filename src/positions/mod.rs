pub mod locator;
pub mod reader;

use alloy::primitives::{Address, U256};

use crate::math::tick::TickRange;

/// Snapshot of one LP NFT. Value type: the AMM is authoritative and every
/// cycle rebuilds these from chain state.
#[derive(Debug, Clone)]
pub struct Position {
    pub token_id: U256,
    pub manager: Address,
    pub token0: Address,
    pub token1: Address,
    pub tick_spacing: i32,
    pub range: TickRange,
    pub liquidity: u128,
    pub tokens_owed0: u128,
    pub tokens_owed1: u128,
    /// Gauge custodying the NFT, when staked.
    pub gauge: Option<Address>,
}

impl Position {
    pub fn is_staked(&self) -> bool {
        self.gauge.is_some()
    }

    /// Unordered pair match, for deciding whether a gauge serves this
    /// position's pool.
    pub fn pair_matches(&self, token0: Address, token1: Address) -> bool {
        (self.token0 == token0 && self.token1 == token1)
            || (self.token0 == token1 && self.token1 == token0)
    }
}
