pub mod aggregator;
pub mod router;

use alloy::primitives::{Address, TxHash, U256};
use alloy::rpc::types::TransactionReceipt;
use async_trait::async_trait;

use crate::chain::ChainClient;
use crate::chain::contracts::IERC20;
use crate::error::{KeeperError, revert_reason};

#[derive(Debug, Clone, Copy)]
pub struct SwapRequest {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    /// Pool the tokens came from. The direct-router variant quotes against
    /// it; the aggregator routes freely and ignores it.
    pub pool_hint: Option<Address>,
}

#[derive(Debug, Clone, Copy)]
pub struct SwapReceipt {
    pub tx_hash: TxHash,
    /// Realized output decoded from the receipt's Transfer logs when
    /// available, else the build-time estimate.
    pub amount_out: Option<U256>,
    pub gas_fee_wei: u128,
}

/// Polymorphic swap seam. Either the whole quote→build→send sequence
/// completes with a confirmed receipt, or it fails; `Ok(None)` means
/// `amount_in` was zero and no swap was performed.
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn swap(
        &self,
        chain: &mut ChainClient,
        request: &SwapRequest,
    ) -> Result<Option<SwapReceipt>, KeeperError>;
}

/// Integer slippage bound: `amount · (10_000 − bps) / 10_000`.
pub fn amount_out_minimum(amount: U256, slippage_bps: u32) -> U256 {
    debug_assert!(slippage_bps <= 10_000);
    amount * U256::from(10_000 - slippage_bps) / U256::from(10_000u32)
}

/// Sum of the token's Transfer amounts to `recipient` in a swap receipt.
pub fn realized_amount_out(
    receipt: &TransactionReceipt,
    token_out: Address,
    recipient: Address,
) -> Option<U256> {
    let mut total = U256::ZERO;
    let mut seen = false;
    for log in receipt.inner.logs() {
        if log.address() != token_out {
            continue;
        }
        if let Ok(decoded) = log.log_decode::<IERC20::Transfer>() {
            if decoded.inner.data.to == recipient {
                total += decoded.inner.data.value;
                seen = true;
            }
        }
    }
    seen.then_some(total)
}

/// Fold a submission failure into the route-reverted kind so the caller
/// can apply the retry-once-with-fresh-quote rule.
pub(crate) fn classify_send_error(error: KeeperError) -> KeeperError {
    match error {
        KeeperError::RpcTransient { ref message, .. } if message.contains("execution reverted") => {
            KeeperError::RouteReverted {
                reason: revert_reason(message),
            }
        }
        KeeperError::TxReverted { .. } => KeeperError::RouteReverted {
            reason: "CallFailed".into(),
        },
        other => other,
    }
}
