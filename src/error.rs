use alloy::primitives::{Address, TxHash};
use thiserror::Error;

/// Error taxonomy for the keeper. Stage logic pattern-matches on these kinds
/// to choose between retry, advance, and fail.
#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("config: {0}")]
    Config(String),

    #[error("rpc {op}: {message}")]
    RpcTransient { op: String, message: String },

    #[error("nonce expired (chain view is ahead of local counter)")]
    NonceExpired,

    #[error("untrusted router {router}")]
    UntrustedRouter { router: Address },

    #[error("router mismatch: quote returned {quoted}, build returned {built}")]
    RouterMismatch { quoted: Address, built: Address },

    #[error("swap route reverted: {reason}")]
    RouteReverted { reason: String },

    #[error("mint reverted: {reason}")]
    MintReverted { reason: String },

    #[error("{label} tx reverted (hash {hash})")]
    TxReverted { label: String, hash: TxHash },

    #[error("no pool found for {token0}/{token1}")]
    PoolNotFound { token0: Address, token1: Address },

    #[error("invalid tick range: {0}")]
    InvalidRange(String),

    #[error("aggregator: {0}")]
    Aggregator(String),

    #[error("event {event} not found in receipt {hash}")]
    EventNotFound { event: &'static str, hash: TxHash },

    #[error("cancelled by shutdown signal")]
    Cancelled,

    #[error("stage {stage}: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<KeeperError>,
    },
}

impl KeeperError {
    pub fn at_stage(self, stage: &'static str) -> KeeperError {
        KeeperError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// Swap-executor errors that warrant one retry with a fresh quote.
    pub fn is_retryable_route(&self) -> bool {
        match self {
            KeeperError::RouteReverted { reason } => {
                reason.contains("CallFailed")
                    || reason.contains("InsufficientReturn")
                    || reason.contains("TransferFromFailed")
            }
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            KeeperError::Cancelled => true,
            KeeperError::Stage { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Classify a provider/transport error string as a stale-nonce rejection.
pub fn is_nonce_expired_message(message: &str) -> bool {
    let m = message.to_lowercase();
    m.contains("nonce too low") || m.contains("nonce_expired") || m.contains("invalid nonce")
}

/// Pull the human-readable revert reason out of an RPC error string.
/// Node errors look like `execution reverted: STF` with assorted framing.
pub fn revert_reason(message: &str) -> String {
    if let Some(idx) = message.find("execution reverted") {
        let tail = message[idx + "execution reverted".len()..]
            .trim_start_matches([':', ' ']);
        if tail.is_empty() {
            "execution reverted".to_string()
        } else {
            tail.trim_end_matches(['"', '}', ')']).trim().to_string()
        }
    } else {
        message.to_string()
    }
}
