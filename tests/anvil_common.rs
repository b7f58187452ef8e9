use alloy::node_bindings::Anvil;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::sol;

// ── Test-only token interface ────────────────────────────────────────

sol! {
    #[sol(rpc)]
    contract TestToken {
        function transfer(address to, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
        // WETH-style wrap entry point
        function deposit() external payable;
    }
}

// ── Fork context ─────────────────────────────────────────────────────

pub struct ForkContext {
    pub _anvil: alloy::node_bindings::AnvilInstance,
    pub rpc_url: String,
    pub wallet_address: Address,
    pub private_key: String,
}

/// Spawn an Anvil fork of the given chain. Requires `anvil` on PATH.
pub fn spawn_fork(fork_url: &str, chain_id: u64) -> ForkContext {
    let anvil = Anvil::new().fork(fork_url).chain_id(chain_id).spawn();

    let rpc_url = anvil.endpoint();
    let wallet_address = anvil.addresses()[0];
    let private_key = hex::encode(anvil.keys()[0].to_bytes());

    ForkContext {
        _anvil: anvil,
        rpc_url,
        wallet_address,
        private_key,
    }
}

impl ForkContext {
    fn read_provider(&self) -> impl Provider + Clone {
        ProviderBuilder::new().connect_http(self.rpc_url.parse().unwrap())
    }

    fn wallet_provider(&self) -> impl Provider + Clone {
        let signer: alloy::signers::local::PrivateKeySigner =
            self.private_key.parse().unwrap();
        ProviderBuilder::new()
            .wallet(alloy::network::EthereumWallet::from(signer))
            .connect_http(self.rpc_url.parse().unwrap())
    }

    /// Set a native balance via anvil_setBalance.
    pub async fn set_native_balance(&self, addr: Address, amount: U256) {
        let _: () = self
            .read_provider()
            .raw_request("anvil_setBalance".into(), (addr, amount))
            .await
            .expect("anvil_setBalance failed");
    }

    /// Wrap native currency into the wrapped token from the test wallet.
    pub async fn wrap_native(&self, wrapped: Address, amount: U256) {
        let provider = self.wallet_provider();
        let token = TestToken::new(wrapped, &provider);
        token
            .deposit()
            .value(amount)
            .send()
            .await
            .expect("wrap deposit failed")
            .get_receipt()
            .await
            .expect("wrap deposit receipt failed");
    }

    /// Fund the test wallet with an ERC-20 by impersonating a whale.
    pub async fn fund_from_whale(&self, token: Address, whale: Address, amount: U256) {
        let provider = self.read_provider();

        let _: () = provider
            .raw_request("anvil_impersonateAccount".into(), [whale])
            .await
            .expect("anvil_impersonateAccount failed");
        // Whale needs gas for the transfer.
        self.set_native_balance(whale, U256::from(10u128.pow(19))).await;

        let erc20 = TestToken::new(token, &provider);
        erc20
            .transfer(self.wallet_address, amount)
            .from(whale)
            .send()
            .await
            .expect("whale transfer failed")
            .get_receipt()
            .await
            .expect("whale transfer receipt failed");

        let _: () = provider
            .raw_request("anvil_stopImpersonatingAccount".into(), [whale])
            .await
            .expect("anvil_stopImpersonatingAccount failed");
    }

    /// ERC-20 balance through a plain provider, independent of the keeper's
    /// own read path.
    pub async fn erc20_balance(&self, token: Address, holder: Address) -> U256 {
        let provider = self.read_provider();
        TestToken::new(token, &provider)
            .balanceOf(holder)
            .call()
            .await
            .expect("balanceOf call failed")
    }
}

// ── Config builder ───────────────────────────────────────────────────

/// Keeper config pointed at the fork, with destructive actions enabled and
/// the aggregator swap variant left at its defaults.
pub fn make_config(ctx: &ForkContext) -> range_keeper::config::Config {
    range_keeper::config::Config {
        rpc_url: ctx.rpc_url.clone(),
        private_key: ctx.private_key.clone(),
        check_interval: std::time::Duration::from_secs(30),
        slippage_bps: 300,
        min_swap_value_usdc: 20.0,
        auto_rebalance: true,
        range_multiplier: 2.6,
        rebalance_threshold: 20.0,
        gas_strategy: range_keeper::config::GasStrategy::Auto,
        max_gas_price_gwei: None,
        priority_fee_gwei: 0.001,
        rpc_call_timeout: std::time::Duration::from_secs(30),
        tx_wait_timeout: std::time::Duration::from_secs(180),
        settle_after_unstake: std::time::Duration::from_millis(100),
        settle_after_withdraw: std::time::Duration::from_millis(100),
        settle_after_swap: std::time::Duration::from_millis(100),
        position_manager: "0x827922686190790b37229fd06084350E74485b72"
            .parse()
            .unwrap(),
        gauges: Vec::new(),
        factories: vec![
            "0x5e7BB104d84c7CB9B682AaC2F3d509f5F406809A".parse().unwrap(),
        ],
        fee_tiers: vec![100, 500, 3_000, 10_000],
        quoter: None,
        swap_router: None,
        permit2: Some(
            "0x000000000022D473030F116dDEE9F6B43aC78BA3".parse().unwrap(),
        ),
        token0: None,
        token1: None,
        swap_variant: range_keeper::config::SwapVariant::Aggregator,
        aggregator: range_keeper::config::AggregatorConfig {
            base_url: "https://aggregator-api.kyberswap.com".into(),
            chain: "base".into(),
            client_id: None,
            source: None,
            included_sources: None,
            allowed_routers: Vec::new(),
        },
    }
}
