use std::collections::HashMap;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256, Uint};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;

use crate::chain::cache::{MetaCache, PoolMeta, TokenMeta};
use crate::chain::contracts::{ICLPool, IERC20, IPermit2};
use crate::chain::fees::{FeePolicy, GasFees};
use crate::chain::nonce::NonceCounter;
use crate::config::{Config, GasStrategy};
use crate::error::{KeeperError, is_nonce_expired_message};

/// A pool's fast-changing state view.
#[derive(Debug, Clone, Copy)]
pub struct Slot0 {
    pub sqrt_price_x96: U256,
    pub tick: i32,
}

/// Typed wrapper over the JSON-RPC connection. Owns the signing account,
/// its nonce counter, the fee policy, and the metadata/approval caches;
/// every write in the process goes through `send`.
pub struct ChainClient {
    provider: DynProvider,
    account: Address,
    nonce: NonceCounter,
    fees: FeePolicy,
    rpc_timeout: Duration,
    tx_timeout: Duration,
    permit2: Option<Address>,
    pub meta: MetaCache,
    allowances: HashMap<(Address, Address), U256>,
    permit2_allowances: HashMap<(Address, Address), U256>,
}

impl ChainClient {
    pub async fn connect(config: &Config) -> Result<Self, KeeperError> {
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .map_err(|e| KeeperError::Config(format!("invalid private key: {e}")))?;
        let account = signer.address();
        let wallet = EthereumWallet::from(signer);
        let url = config
            .rpc_url
            .parse()
            .map_err(|e| KeeperError::Config(format!("invalid BASE_RPC_URL: {e}")))?;
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url).erased();

        let next_nonce = match tokio::time::timeout(
            config.rpc_call_timeout,
            provider.get_transaction_count(account).pending(),
        )
        .await
        {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                return Err(KeeperError::RpcTransient {
                    op: "transactionCount".into(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(KeeperError::RpcTransient {
                    op: "transactionCount".into(),
                    message: "timed out".into(),
                });
            }
        };

        Ok(ChainClient {
            provider,
            account,
            nonce: NonceCounter::new(next_nonce),
            fees: FeePolicy::from_config(config),
            rpc_timeout: config.rpc_call_timeout,
            tx_timeout: config.tx_wait_timeout,
            permit2: config.permit2,
            meta: MetaCache::default(),
            allowances: HashMap::new(),
            permit2_allowances: HashMap::new(),
        })
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn provider(&self) -> DynProvider {
        self.provider.clone()
    }

    pub fn next_nonce(&self) -> u64 {
        self.nonce.peek()
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Timeout-bounded read with one retry for transient failures.
    pub async fn read<T, F, Fut, E>(&self, op: &str, f: F) -> Result<T, KeeperError>
    where
        F: Fn() -> Fut,
        Fut: IntoFuture<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last = None;
        for attempt in 0..2 {
            match tokio::time::timeout(self.rpc_timeout, f()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    last = Some(KeeperError::RpcTransient {
                        op: op.to_string(),
                        message: e.to_string(),
                    });
                }
                Err(_) => {
                    last = Some(KeeperError::RpcTransient {
                        op: op.to_string(),
                        message: "timed out".into(),
                    });
                }
            }
            if attempt == 0 {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
        Err(last.expect("two attempts recorded an error"))
    }

    /// eth_call from the keeper account. The caller inspects the error
    /// message for revert reasons.
    pub async fn static_call(
        &self,
        tx: TransactionRequest,
        label: &str,
    ) -> Result<Bytes, KeeperError> {
        let tx = tx.with_from(self.account);
        match tokio::time::timeout(self.rpc_timeout, self.provider.call(tx)).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => Err(KeeperError::RpcTransient {
                op: label.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(KeeperError::RpcTransient {
                op: label.to_string(),
                message: "timed out".into(),
            }),
        }
    }

    pub async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, KeeperError> {
        let erc20 = IERC20::new(token, self.provider.clone());
        self.read("balanceOf", || async { erc20.balanceOf(owner).call().await })
            .await
    }

    /// ERC-20 metadata, cached after the first observation.
    pub async fn token_meta(&mut self, token: Address) -> Result<TokenMeta, KeeperError> {
        if let Some(meta) = self.meta.token(token) {
            return Ok(meta.clone());
        }
        let erc20 = IERC20::new(token, self.provider.clone());
        let (decimals, symbol) = tokio::try_join!(
            self.read("decimals", || async { erc20.decimals().call().await }),
            self.read("symbol", || async { erc20.symbol().call().await }),
        )?;
        let meta = TokenMeta { symbol, decimals };
        Ok(self.meta.insert_token(token, meta).clone())
    }

    /// Structural pool fields, cached after the first observation.
    pub async fn pool_meta(&mut self, pool: Address) -> Result<PoolMeta, KeeperError> {
        if let Some(meta) = self.meta.pool(pool) {
            return Ok(*meta);
        }
        let contract = ICLPool::new(pool, self.provider.clone());
        let (token0, token1, tick_spacing, fee) = tokio::try_join!(
            self.read("pool.token0", || async { contract.token0().call().await }),
            self.read("pool.token1", || async { contract.token1().call().await }),
            self.read("pool.tickSpacing", || async { contract.tickSpacing().call().await }),
            self.read("pool.fee", || async { contract.fee().call().await }),
        )?;
        let meta = PoolMeta {
            token0,
            token1,
            tick_spacing: tick_spacing.as_i32(),
            fee: fee.to::<u32>(),
        };
        Ok(*self.meta.insert_pool(pool, meta))
    }

    pub async fn slot0(&self, pool: Address) -> Result<Slot0, KeeperError> {
        let contract = ICLPool::new(pool, self.provider.clone());
        let s = self
            .read("slot0", || async { contract.slot0().call().await })
            .await?;
        Ok(Slot0 {
            sqrt_price_x96: U256::from_limbs_slice(s.sqrtPriceX96.as_limbs()),
            tick: s.tick.as_i32(),
        })
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Submit a transaction and wait for its receipt. Gas limit is the
    /// node estimate with 20% headroom; pricing follows the fee policy.
    /// A stale-nonce rejection resyncs the counter from the chain and
    /// retries exactly once.
    pub async fn send(
        &mut self,
        tx: TransactionRequest,
        label: &str,
    ) -> Result<TransactionReceipt, KeeperError> {
        match self.submit(tx.clone(), label).await {
            Err(KeeperError::NonceExpired) => {
                println!("  TX: {label}: nonce expired, resyncing counter and retrying once");
                self.resync_nonce().await?;
                self.submit(tx, label).await
            }
            other => other,
        }
    }

    async fn submit(
        &mut self,
        tx: TransactionRequest,
        label: &str,
    ) -> Result<TransactionReceipt, KeeperError> {
        let tx = tx.with_from(self.account);

        let estimate = match tokio::time::timeout(
            self.rpc_timeout,
            self.provider.estimate_gas(tx.clone()),
        )
        .await
        {
            Ok(Ok(gas)) => gas,
            Ok(Err(e)) => {
                return Err(KeeperError::RpcTransient {
                    op: format!("{label}.estimateGas"),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(KeeperError::RpcTransient {
                    op: format!("{label}.estimateGas"),
                    message: "timed out".into(),
                });
            }
        };
        let mut tx = tx.with_gas_limit(estimate.saturating_mul(12) / 10);

        let (base_fee, node_gas_price) = self.fee_inputs().await?;
        match self.fees.compute(base_fee, node_gas_price) {
            GasFees::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                tx = tx
                    .with_max_fee_per_gas(max_fee_per_gas)
                    .with_max_priority_fee_per_gas(max_priority_fee_per_gas);
            }
            GasFees::Legacy { gas_price } => {
                tx = tx.with_gas_price(gas_price);
            }
        }

        let tx = tx.with_nonce(self.nonce.peek());

        let pending = match tokio::time::timeout(
            self.rpc_timeout,
            self.provider.send_transaction(tx),
        )
        .await
        {
            Ok(Ok(pending)) => pending,
            Ok(Err(e)) => {
                let message = e.to_string();
                if is_nonce_expired_message(&message) {
                    return Err(KeeperError::NonceExpired);
                }
                return Err(KeeperError::RpcTransient {
                    op: format!("{label}.send"),
                    message,
                });
            }
            Err(_) => {
                return Err(KeeperError::RpcTransient {
                    op: format!("{label}.send"),
                    message: "timed out".into(),
                });
            }
        };
        // The node accepted the transaction: this nonce is consumed even if
        // the transaction later reverts.
        self.nonce.advance();

        let receipt = pending
            .with_timeout(Some(self.tx_timeout))
            .get_receipt()
            .await
            .map_err(|e| KeeperError::RpcTransient {
                op: format!("{label}.receipt"),
                message: e.to_string(),
            })?;

        if !receipt.status() {
            return Err(KeeperError::TxReverted {
                label: label.to_string(),
                hash: receipt.transaction_hash,
            });
        }
        println!(
            "  TX: {label}: {:?} (gas {})",
            receipt.transaction_hash, receipt.gas_used
        );
        Ok(receipt)
    }

    async fn resync_nonce(&mut self) -> Result<(), KeeperError> {
        let next = self
            .read("transactionCount", || {
                self.provider.get_transaction_count(self.account).pending()
            })
            .await?;
        self.nonce.reset(next);
        Ok(())
    }

    async fn fee_inputs(&self) -> Result<(u128, u128), KeeperError> {
        match self.fees.strategy() {
            GasStrategy::Auto => {
                let block = self
                    .read("latestBlock", || {
                        self.provider.get_block_by_number(BlockNumberOrTag::Latest)
                    })
                    .await?;
                let base_fee = block
                    .and_then(|b| b.header.base_fee_per_gas)
                    .unwrap_or(0) as u128;
                Ok((base_fee, 0))
            }
            GasStrategy::Legacy => {
                let price = self.read("gasPrice", || self.provider.get_gas_price()).await?;
                Ok((0, price))
            }
        }
    }

    // ── Approvals ──────────────────────────────────────────────────

    /// Make sure `spender` can pull at least `amount` of `token`. Grants
    /// an unbounded allowance on first need and caches the observation so
    /// repeat swaps skip the read and the send entirely.
    pub async fn ensure_allowance(
        &mut self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), KeeperError> {
        if amount.is_zero() {
            return Ok(());
        }
        if let Some(cached) = self.allowances.get(&(token, spender)) {
            if *cached >= amount {
                return Ok(());
            }
        }
        let erc20 = IERC20::new(token, self.provider.clone());
        let current = self
            .read("allowance", || async {
                erc20.allowance(self.account, spender).call().await
            })
            .await?;
        if current >= amount {
            self.allowances.insert((token, spender), current);
            return Ok(());
        }
        println!("  APPROVE: token {token} for spender {spender}");
        let data = IERC20::approveCall {
            spender,
            amount: U256::MAX,
        }
        .abi_encode();
        let tx = TransactionRequest::default()
            .with_to(token)
            .with_input(data);
        self.send(tx, "approve").await?;
        self.allowances.insert((token, spender), U256::MAX);
        Ok(())
    }

    /// Exact-amount approval for the mint path. Not cached: the position
    /// manager pulls once per mint and the amount changes every time.
    pub async fn approve_exact(
        &mut self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), KeeperError> {
        if amount.is_zero() {
            return Ok(());
        }
        let data = IERC20::approveCall { spender, amount }.abi_encode();
        let tx = TransactionRequest::default()
            .with_to(token)
            .with_input(data);
        self.send(tx, "approve").await?;
        Ok(())
    }

    /// Two-step allowance for routers that pull through Permit2: first a
    /// standard approval of the Permit2 contract, then a Permit2-level
    /// grant to the router when its allowance is short or expired.
    pub async fn ensure_permit2_allowance(
        &mut self,
        token: Address,
        router: Address,
        amount: U256,
    ) -> Result<(), KeeperError> {
        let Some(permit2) = self.permit2 else {
            return self.ensure_allowance(token, router, amount).await;
        };
        self.ensure_allowance(token, permit2, amount).await?;

        if let Some(cached) = self.permit2_allowances.get(&(token, router)) {
            if *cached >= amount {
                return Ok(());
            }
        }
        let contract = IPermit2::new(permit2, self.provider.clone());
        let current = self
            .read("permit2.allowance", || async {
                contract.allowance(self.account, token, router).call().await
            })
            .await?;
        let current_amount = U256::from_limbs_slice(current.amount.as_limbs());
        let now = chrono::Utc::now().timestamp() as u64;
        if current_amount >= amount && current.expiration.to::<u64>() > now {
            self.permit2_allowances.insert((token, router), current_amount);
            return Ok(());
        }

        println!("  APPROVE: permit2 grant for token {token} to router {router}");
        let data = IPermit2::approveCall {
            token,
            spender: router,
            amount: Uint::<160, 3>::MAX,
            expiration: Uint::<48, 1>::MAX,
        }
        .abi_encode();
        let tx = TransactionRequest::default()
            .with_to(permit2)
            .with_input(data);
        self.send(tx, "permit2.approve").await?;
        self.permit2_allowances.insert(
            (token, router),
            U256::from_limbs_slice(Uint::<160, 3>::MAX.as_limbs()),
        );
        Ok(())
    }
}

/// Total gas fee a confirmed transaction spent, in wei.
pub fn gas_fee_wei(receipt: &TransactionReceipt) -> u128 {
    receipt.gas_used as u128 * receipt.effective_gas_price
}
