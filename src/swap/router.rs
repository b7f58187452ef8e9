use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, U256, Uint};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use async_trait::async_trait;

use crate::chain::ChainClient;
use crate::chain::client::gas_fee_wei;
use crate::chain::contracts::{IQuoterV2, ISwapRouter};
use crate::error::KeeperError;
use crate::swap::{
    SwapExecutor, SwapReceipt, SwapRequest, amount_out_minimum, classify_send_error,
    realized_amount_out,
};

/// Direct on-chain variant: static quoter call for the expected output,
/// then `exactInputSingle` against the configured router with the same
/// integer min-out bound. Needs a pool hint to pick the fee tier.
pub struct RouterSwap {
    router: Address,
    quoter: Address,
    slippage_bps: u32,
}

impl RouterSwap {
    pub fn new(router: Address, quoter: Address, slippage_bps: u32) -> Self {
        RouterSwap {
            router,
            quoter,
            slippage_bps,
        }
    }

    async fn attempt(
        &self,
        chain: &mut ChainClient,
        request: &SwapRequest,
    ) -> Result<Option<SwapReceipt>, KeeperError> {
        let pool = request.pool_hint.ok_or(KeeperError::PoolNotFound {
            token0: request.token_in,
            token1: request.token_out,
        })?;
        let fee = Uint::<24, 1>::from(chain.pool_meta(pool).await?.fee);

        let quoter = IQuoterV2::new(self.quoter, chain.provider());
        let params = IQuoterV2::QuoteExactInputSingleParams {
            tokenIn: request.token_in,
            tokenOut: request.token_out,
            amountIn: request.amount_in,
            fee,
            sqrtPriceLimitX96: Uint::<160, 3>::ZERO,
        };
        let quote = chain
            .read("quoter.quoteExactInputSingle", || async {
                quoter.quoteExactInputSingle(params.clone()).call().await
            })
            .await
            .map_err(classify_send_error)?;
        let min_out = amount_out_minimum(quote.amountOut, self.slippage_bps);
        println!(
            "  SWAP: quoter expects {} out, floor {}",
            quote.amountOut, min_out
        );

        chain
            .ensure_allowance(request.token_in, self.router, request.amount_in)
            .await?;

        let deadline = U256::from(chrono::Utc::now().timestamp() as u64 + 300);
        let data = ISwapRouter::exactInputSingleCall {
            params: ISwapRouter::ExactInputSingleParams {
                tokenIn: request.token_in,
                tokenOut: request.token_out,
                fee,
                recipient: chain.account(),
                deadline,
                amountIn: request.amount_in,
                amountOutMinimum: min_out,
                sqrtPriceLimitX96: Uint::<160, 3>::ZERO,
            },
        }
        .abi_encode();
        let tx = TransactionRequest::default()
            .with_to(self.router)
            .with_input(data);
        let receipt = chain.send(tx, "swap").await.map_err(classify_send_error)?;

        Ok(Some(SwapReceipt {
            tx_hash: receipt.transaction_hash,
            amount_out: realized_amount_out(&receipt, request.token_out, chain.account()),
            gas_fee_wei: gas_fee_wei(&receipt),
        }))
    }
}

#[async_trait]
impl SwapExecutor for RouterSwap {
    fn name(&self) -> &'static str {
        "router"
    }

    async fn swap(
        &self,
        chain: &mut ChainClient,
        request: &SwapRequest,
    ) -> Result<Option<SwapReceipt>, KeeperError> {
        if request.amount_in.is_zero() {
            return Ok(None);
        }
        match self.attempt(chain, request).await {
            Err(e) if e.is_retryable_route() => {
                println!("  SWAP: retrying once with a fresh quote after: {e}");
                self.attempt(chain, request).await
            }
            other => other,
        }
    }
}
