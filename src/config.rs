use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;

use crate::error::KeeperError;

/// Aerodrome Slipstream NonfungiblePositionManager on Base.
const DEFAULT_POSITION_MANAGER: &str = "0x827922686190790b37229fd06084350E74485b72";
/// Aerodrome Slipstream CLFactory on Base.
const DEFAULT_FACTORY: &str = "0x5e7BB104d84c7CB9B682AaC2F3d509f5F406809A";
/// Canonical Permit2 deployment (same address on every chain).
const DEFAULT_PERMIT2: &str = "0x000000000022D473030F116dDEE9F6B43aC78BA3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasStrategy {
    /// EIP-1559 type-2 transactions from the chain base fee.
    Auto,
    /// Single gas-price transactions for chains without EIP-1559.
    Legacy,
}

impl FromStr for GasStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(GasStrategy::Auto),
            "legacy" => Ok(GasStrategy::Legacy),
            other => Err(format!("invalid GAS_STRATEGY '{other}', use 'auto' or 'legacy'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapVariant {
    /// Off-chain aggregator: HTTP quote + build, send returned calldata.
    Aggregator,
    /// Direct on-chain router: quoter static call + exactInputSingle.
    Router,
}

impl FromStr for SwapVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aggregator" => Ok(SwapVariant::Aggregator),
            "router" => Ok(SwapVariant::Router),
            other => Err(format!("invalid SWAP_VARIANT '{other}', use 'aggregator' or 'router'")),
        }
    }
}

/// Aggregator HTTP endpoint configuration.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub base_url: String,
    pub chain: String,
    pub client_id: Option<String>,
    pub source: Option<String>,
    pub included_sources: Option<String>,
    /// Routers the aggregator is allowed to hand us. Empty = allow any.
    pub allowed_routers: Vec<Address>,
}

/// Resolved runtime configuration. Every recognized environment key is
/// enumerated here; anything missing or malformed fails at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub private_key: String,
    pub check_interval: Duration,
    pub slippage_bps: u32,
    pub min_swap_value_usdc: f64,
    pub auto_rebalance: bool,
    pub range_multiplier: f64,
    pub rebalance_threshold: f64,

    pub gas_strategy: GasStrategy,
    pub max_gas_price_gwei: Option<f64>,
    pub priority_fee_gwei: f64,

    pub rpc_call_timeout: Duration,
    pub tx_wait_timeout: Duration,
    pub settle_after_unstake: Duration,
    pub settle_after_withdraw: Duration,
    pub settle_after_swap: Duration,

    pub position_manager: Address,
    pub gauges: Vec<Address>,
    pub factories: Vec<Address>,
    pub fee_tiers: Vec<u32>,
    pub quoter: Option<Address>,
    pub swap_router: Option<Address>,
    pub permit2: Option<Address>,
    /// Token pair used by bootstrap when the wallet holds no positions.
    pub token0: Option<Address>,
    pub token1: Option<Address>,

    pub swap_variant: SwapVariant,
    pub aggregator: AggregatorConfig,
}

impl Config {
    /// Assemble from the environment. Resolution for the signing key:
    /// `PRIVATE_KEY` directly, or `PRIVATE_KEY_FILE` pointing at a file
    /// (preferred in containers — the key never appears in `env` output).
    pub fn from_env() -> Result<Self, KeeperError> {
        let private_key = if let Ok(pk) = std::env::var("PRIVATE_KEY") {
            pk.trim().to_string()
        } else if let Ok(path) = std::env::var("PRIVATE_KEY_FILE") {
            std::fs::read_to_string(&path)
                .map_err(|e| KeeperError::Config(format!("reading PRIVATE_KEY_FILE {path}: {e}")))?
                .trim()
                .to_string()
        } else {
            return Err(KeeperError::Config(
                "PRIVATE_KEY not configured. Set PRIVATE_KEY or PRIVATE_KEY_FILE.".into(),
            ));
        };
        if private_key.is_empty() {
            return Err(KeeperError::Config("PRIVATE_KEY is empty".into()));
        }

        let check_interval_ms: u64 = env_parse("CHECK_INTERVAL", 30_000)?;
        if check_interval_ms == 0 {
            return Err(KeeperError::Config("CHECK_INTERVAL must be positive".into()));
        }

        let slippage_bps: u32 = env_parse("SLIPPAGE_BPS", 300)?;
        if slippage_bps > 10_000 {
            return Err(KeeperError::Config(format!(
                "SLIPPAGE_BPS {slippage_bps} exceeds 10000"
            )));
        }

        let range_multiplier: f64 = env_parse("RANGE_MULTIPLIER", 2.6)?;
        if range_multiplier <= 0.0 {
            return Err(KeeperError::Config("RANGE_MULTIPLIER must be positive".into()));
        }

        let gas_strategy: GasStrategy = env_parse_str("GAS_STRATEGY", GasStrategy::Auto)?;
        let swap_variant: SwapVariant = env_parse_str("SWAP_VARIANT", SwapVariant::Aggregator)?;

        let config = Config {
            rpc_url: env_or("BASE_RPC_URL", "https://mainnet.base.org"),
            private_key,
            check_interval: Duration::from_millis(check_interval_ms),
            slippage_bps,
            min_swap_value_usdc: env_parse("MIN_SWAP_VALUE_USDC", 20.0)?,
            auto_rebalance: env_parse_bool("AUTO_REBALANCE", false)?,
            range_multiplier,
            rebalance_threshold: env_parse("REBALANCE_THRESHOLD", 20.0)?,

            gas_strategy,
            max_gas_price_gwei: env_parse_opt("MAX_GAS_PRICE")?,
            priority_fee_gwei: env_parse("PRIORITY_FEE_GWEI", 0.001)?,

            rpc_call_timeout: Duration::from_millis(env_parse("RPC_CALL_TIMEOUT_MS", 30_000)?),
            tx_wait_timeout: Duration::from_millis(env_parse("TX_WAIT_TIMEOUT_MS", 180_000)?),
            settle_after_unstake: Duration::from_millis(env_parse("SETTLE_UNSTAKE_MS", 2_000)?),
            settle_after_withdraw: Duration::from_millis(env_parse("SETTLE_WITHDRAW_MS", 2_000)?),
            settle_after_swap: Duration::from_millis(env_parse("SETTLE_SWAP_MS", 3_000)?),

            position_manager: env_addr_or("POSITION_MANAGER", DEFAULT_POSITION_MANAGER)?,
            gauges: env_addr_list("GAUGES")?,
            factories: {
                let f = env_addr_list("FACTORIES")?;
                if f.is_empty() {
                    vec![DEFAULT_FACTORY.parse().expect("default factory address")]
                } else {
                    f
                }
            },
            fee_tiers: env_u32_list("FEE_TIERS", &[100, 500, 3_000, 10_000])?,
            quoter: env_addr_opt("QUOTER")?,
            swap_router: env_addr_opt("SWAP_ROUTER")?,
            permit2: match env_or("PERMIT2", DEFAULT_PERMIT2).as_str() {
                "" | "none" => None,
                s => Some(parse_addr("PERMIT2", s)?),
            },
            token0: env_addr_opt("TOKEN0")?,
            token1: env_addr_opt("TOKEN1")?,

            swap_variant,
            aggregator: AggregatorConfig {
                base_url: env_or("API_BASE_URL", "https://aggregator-api.kyberswap.com"),
                chain: env_or("CHAIN", "base"),
                client_id: std::env::var("CLIENT_ID").ok().filter(|s| !s.is_empty()),
                source: std::env::var("SOURCE").ok().filter(|s| !s.is_empty()),
                included_sources: std::env::var("INCLUDED_SOURCES").ok().filter(|s| !s.is_empty()),
                allowed_routers: env_addr_list("ALLOWED_ROUTERS")?,
            },
        };

        if config.swap_variant == SwapVariant::Router {
            if config.swap_router.is_none() {
                return Err(KeeperError::Config(
                    "SWAP_VARIANT=router requires SWAP_ROUTER".into(),
                ));
            }
            if config.quoter.is_none() {
                return Err(KeeperError::Config(
                    "SWAP_VARIANT=router requires QUOTER".into(),
                ));
            }
        }

        Ok(config)
    }

    /// Startup banner: one line per knob that matters.
    pub fn print_summary(&self, account: Address) {
        println!("=== range-keeper ===");
        println!("Account:   {account}");
        println!("RPC:       {}", self.rpc_url);
        println!("Interval:  {:?}", self.check_interval);
        println!("Slippage:  {} bps", self.slippage_bps);
        println!("Rebalance: auto={} threshold={}% multiplier={}",
            self.auto_rebalance, self.rebalance_threshold, self.range_multiplier);
        println!("Swap:      {:?} (min ${})", self.swap_variant, self.min_swap_value_usdc);
        println!("Gas:       {:?} cap={:?} gwei prio={} gwei",
            self.gas_strategy, self.max_gas_price_gwei, self.priority_fee_gwei);
        println!("Gauges:    {}", self.gauges.len());
        println!();
    }
}

// ── Env helpers ────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, KeeperError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| KeeperError::Config(format!("{key}='{raw}': {e}"))),
        Err(_) => Ok(default),
    }
}

fn env_parse_opt<T: FromStr>(key: &str) -> Result<Option<T>, KeeperError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| KeeperError::Config(format!("{key}='{raw}': {e}"))),
        _ => Ok(None),
    }
}

fn env_parse_str<T: FromStr<Err = String>>(key: &str, default: T) -> Result<T, KeeperError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(KeeperError::Config),
        Err(_) => Ok(default),
    }
}

fn env_parse_bool(key: &str, default: bool) -> Result<bool, KeeperError> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            other => Err(KeeperError::Config(format!("{key}='{other}' is not a bool"))),
        },
        Err(_) => Ok(default),
    }
}

fn parse_addr(key: &str, raw: &str) -> Result<Address, KeeperError> {
    raw.trim()
        .parse()
        .map_err(|e| KeeperError::Config(format!("{key}='{raw}' is not an address: {e}")))
}

fn env_addr_or(key: &str, default: &str) -> Result<Address, KeeperError> {
    parse_addr(key, &env_or(key, default))
}

fn env_addr_opt(key: &str) -> Result<Option<Address>, KeeperError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_addr(key, &raw).map(Some),
        _ => Ok(None),
    }
}

/// Comma-separated address list. Order is authoritative: the pool locator
/// and router allowlist honor first-listed-wins.
fn env_addr_list(key: &str) -> Result<Vec<Address>, KeeperError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_addr(key, s))
            .collect(),
        Err(_) => Ok(Vec::new()),
    }
}

fn env_u32_list(key: &str, default: &[u32]) -> Result<Vec<u32>, KeeperError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse()
                    .map_err(|e| KeeperError::Config(format!("{key}='{s}': {e}")))
            })
            .collect(),
        Err(_) => Ok(default.to_vec()),
    }
}
