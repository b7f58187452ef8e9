use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use serde::Deserialize;

use crate::chain::ChainClient;
use crate::chain::client::gas_fee_wei;
use crate::config::AggregatorConfig;
use crate::error::KeeperError;
use crate::swap::{
    SwapExecutor, SwapReceipt, SwapRequest, amount_out_minimum, classify_send_error,
    realized_amount_out,
};

/// Off-chain aggregator variant: signed HTTP quote, HTTP-built calldata,
/// sent to the router the aggregator names. The route and build steps must
/// agree on that router, and it must be allowlisted when a list is set.
pub struct AggregatorSwap {
    http: reqwest::Client,
    config: AggregatorConfig,
    slippage_bps: u32,
}

impl AggregatorSwap {
    pub fn new(config: AggregatorConfig, slippage_bps: u32) -> Self {
        AggregatorSwap {
            http: reqwest::Client::new(),
            config,
            slippage_bps,
        }
    }

    async fn attempt(
        &self,
        chain: &mut ChainClient,
        request: &SwapRequest,
    ) -> Result<Option<SwapReceipt>, KeeperError> {
        let quote = self.fetch_route(request).await?;
        println!(
            "  SWAP: route via {} ({}), quoted out {}",
            self.config.base_url, quote.router, quote.amount_out
        );

        if !self.config.allowed_routers.is_empty()
            && !self.config.allowed_routers.contains(&quote.router)
        {
            return Err(KeeperError::UntrustedRouter { router: quote.router });
        }
        let min_out = amount_out_minimum(quote.amount_out, self.slippage_bps);

        // Build before approving: a router mismatch must abort with no
        // state touched on chain.
        let built = self.build_route(&quote, chain.account()).await?;
        check_router_consistency(quote.router, built.router)?;

        chain
            .ensure_permit2_allowance(request.token_in, quote.router, request.amount_in)
            .await?;

        let tx = TransactionRequest::default()
            .with_to(built.router)
            .with_input(built.calldata.clone())
            .with_value(built.value);
        let receipt = chain.send(tx, "swap").await.map_err(classify_send_error)?;

        let amount_out =
            realized_amount_out(&receipt, request.token_out, chain.account()).or(built.amount_out);
        if let Some(out) = amount_out {
            if out < min_out {
                return Err(KeeperError::RouteReverted {
                    reason: format!("InsufficientReturn: got {out}, minimum {min_out}"),
                });
            }
        }

        Ok(Some(SwapReceipt {
            tx_hash: receipt.transaction_hash,
            amount_out,
            gas_fee_wei: gas_fee_wei(&receipt),
        }))
    }

    async fn fetch_route(&self, request: &SwapRequest) -> Result<RouteQuote, KeeperError> {
        let mut url = format!(
            "{}/{}/api/v1/routes?tokenIn={}&tokenOut={}&amountIn={}",
            self.config.base_url,
            self.config.chain,
            request.token_in,
            request.token_out,
            request.amount_in
        );
        if let Some(sources) = &self.config.included_sources {
            url.push_str("&includedSources=");
            url.push_str(sources);
        }
        let body = self.get_text(&url).await?;
        parse_route_body(&body)
    }

    async fn build_route(
        &self,
        quote: &RouteQuote,
        account: Address,
    ) -> Result<BuiltTx, KeeperError> {
        let url = format!(
            "{}/{}/api/v1/route/build",
            self.config.base_url, self.config.chain
        );
        let mut payload = serde_json::json!({
            "routeSummary": quote.route_summary,
            "sender": format!("{account}"),
            "recipient": format!("{account}"),
            "slippageTolerance": self.slippage_bps,
        });
        if let Some(source) = &self.config.source {
            payload["source"] = serde_json::json!(source);
        }
        let body = self.post_json(&url, &payload).await?;
        parse_build_body(&body)
    }

    async fn get_text(&self, url: &str) -> Result<String, KeeperError> {
        let mut last = None;
        for attempt in 0..2 {
            match self.request_text(self.http.get(url)).await {
                Ok(body) => return Ok(body),
                Err(e) => last = Some(e),
            }
            if attempt == 0 {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
        Err(last.expect("two attempts recorded an error"))
    }

    async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<String, KeeperError> {
        let mut last = None;
        for attempt in 0..2 {
            match self.request_text(self.http.post(url).json(payload)).await {
                Ok(body) => return Ok(body),
                Err(e) => last = Some(e),
            }
            if attempt == 0 {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
        Err(last.expect("two attempts recorded an error"))
    }

    async fn request_text(
        &self,
        mut request: reqwest::RequestBuilder,
    ) -> Result<String, KeeperError> {
        if let Some(client_id) = &self.config.client_id {
            request = request.header("x-client-id", client_id);
        }
        let response = request
            .send()
            .await
            .map_err(|e| KeeperError::Aggregator(format!("request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| KeeperError::Aggregator(format!("reading body: {e}")))?;
        if !status.is_success() {
            let snippet: String = body.chars().take(200).collect();
            return Err(KeeperError::Aggregator(format!("HTTP {status}: {snippet}")));
        }
        Ok(body)
    }
}

#[async_trait]
impl SwapExecutor for AggregatorSwap {
    fn name(&self) -> &'static str {
        "aggregator"
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

// ── Wire types & parsing ───────────────────────────────────────────

#[derive(Debug)]
pub struct RouteQuote {
    pub router: Address,
    pub amount_out: U256,
    pub route_summary: serde_json::Value,
}

#[derive(Debug)]
pub struct BuiltTx {
    pub router: Address,
    pub calldata: Bytes,
    pub value: U256,
    pub amount_out: Option<U256>,
}

#[derive(Deserialize)]
struct RouteEnvelope {
    code: i64,
    message: Option<String>,
    data: Option<RouteData>,
}

#[derive(Deserialize)]
struct RouteData {
    #[serde(rename = "routeSummary")]
    route_summary: serde_json::Value,
    #[serde(rename = "routerAddress")]
    router_address: String,
}

#[derive(Deserialize)]
struct BuildEnvelope {
    code: i64,
    message: Option<String>,
    data: Option<BuildData>,
}

#[derive(Deserialize)]
struct BuildData {
    data: Option<String>,
    #[serde(rename = "encodedSwapData")]
    encoded_swap_data: Option<String>,
    #[serde(rename = "routerAddress")]
    router_address: String,
    #[serde(rename = "amountOut")]
    amount_out: Option<String>,
    #[serde(rename = "transactionValue")]
    transaction_value: Option<String>,
    value: Option<String>,
}

/// Some edge proxies answer with an HTML challenge page instead of JSON.
/// Treat that as a fatal, non-retryable aggregator failure for the attempt.
fn detect_challenge(body: &str) -> Result<(), KeeperError> {
    let head = body.trim_start();
    if head.starts_with('<') || head.to_lowercase().contains("<html") {
        return Err(KeeperError::Aggregator(
            "received an HTML challenge page instead of JSON".into(),
        ));
    }
    Ok(())
}

fn parse_u256_decimal(field: &str, raw: &str) -> Result<U256, KeeperError> {
    U256::from_str_radix(raw.trim(), 10)
        .map_err(|e| KeeperError::Aggregator(format!("{field} '{raw}': {e}")))
}

fn parse_router(field: &str, raw: &str) -> Result<Address, KeeperError> {
    raw.trim()
        .parse()
        .map_err(|e| KeeperError::Aggregator(format!("{field} '{raw}': {e}")))
}

pub fn parse_route_body(body: &str) -> Result<RouteQuote, KeeperError> {
    detect_challenge(body)?;
    let envelope: RouteEnvelope = serde_json::from_str(body)
        .map_err(|e| KeeperError::Aggregator(format!("route response: {e}")))?;
    if envelope.code != 0 {
        return Err(KeeperError::Aggregator(format!(
            "route returned code {}: {}",
            envelope.code,
            envelope.message.unwrap_or_default()
        )));
    }
    let data = envelope
        .data
        .ok_or_else(|| KeeperError::Aggregator("route response missing data".into()))?;
    let router = parse_router("routerAddress", &data.router_address)?;
    let amount_out_raw = data
        .route_summary
        .get("amountOut")
        .and_then(|v| v.as_str())
        .ok_or_else(|| KeeperError::Aggregator("routeSummary missing amountOut".into()))?;
    let amount_out = parse_u256_decimal("amountOut", amount_out_raw)?;
    Ok(RouteQuote {
        router,
        amount_out,
        route_summary: data.route_summary,
    })
}

pub fn parse_build_body(body: &str) -> Result<BuiltTx, KeeperError> {
    detect_challenge(body)?;
    let envelope: BuildEnvelope = serde_json::from_str(body)
        .map_err(|e| KeeperError::Aggregator(format!("build response: {e}")))?;
    if envelope.code != 0 {
        return Err(KeeperError::Aggregator(format!(
            "build returned code {}: {}",
            envelope.code,
            envelope.message.unwrap_or_default()
        )));
    }
    let data = envelope
        .data
        .ok_or_else(|| KeeperError::Aggregator("build response missing data".into()))?;
    let router = parse_router("routerAddress", &data.router_address)?;
    let calldata_raw = data
        .data
        .as_deref()
        .or(data.encoded_swap_data.as_deref())
        .ok_or_else(|| KeeperError::Aggregator("build response missing calldata".into()))?;
    let calldata: Bytes = calldata_raw
        .parse()
        .map_err(|e| KeeperError::Aggregator(format!("build calldata: {e}")))?;
    let value = match data.value.as_deref().or(data.transaction_value.as_deref()) {
        Some(raw) if !raw.is_empty() => {
            if let Some(hex) = raw.strip_prefix("0x") {
                U256::from_str_radix(hex, 16)
                    .map_err(|e| KeeperError::Aggregator(format!("build value '{raw}': {e}")))?
            } else {
                parse_u256_decimal("value", raw)?
            }
        }
        _ => U256::ZERO,
    };
    let amount_out = match data.amount_out.as_deref() {
        Some(raw) => Some(parse_u256_decimal("amountOut", raw)?),
        None => None,
    };
    Ok(BuiltTx {
        router,
        calldata,
        value,
        amount_out,
    })
}

/// The build step must hand back the same router the quote named; anything
/// else means the calldata cannot be trusted.
pub fn check_router_consistency(quoted: Address, built: Address) -> Result<(), KeeperError> {
    if quoted != built {
        return Err(KeeperError::RouterMismatch { quoted, built });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE_OK: &str = r#"{
        "code": 0,
        "message": "successfully",
        "data": {
            "routeSummary": {
                "tokenIn": "0x4200000000000000000000000000000000000006",
                "amountIn": "1000000000000000000",
                "tokenOut": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
                "amountOut": "3100000000",
                "route": []
            },
            "routerAddress": "0x6131B5fae19EA4f9D964eAc0408E4408b66337b5"
        }
    }"#;

    const BUILD_OK: &str = r#"{
        "code": 0,
        "data": {
            "amountOut": "3099000000",
            "routerAddress": "0x6131B5fae19EA4f9D964eAc0408E4408b66337b5",
            "data": "0xdeadbeef",
            "transactionValue": "0"
        }
    }"#;

    #[test]
    fn route_parses_router_and_amount() {
        let quote = parse_route_body(ROUTE_OK).unwrap();
        assert_eq!(
            quote.router,
            "0x6131B5fae19EA4f9D964eAc0408E4408b66337b5"
                .parse::<Address>()
                .unwrap()
        );
        assert_eq!(quote.amount_out, U256::from(3_100_000_000u64));
        assert!(quote.route_summary.get("route").is_some());
    }

    #[test]
    fn nonzero_code_is_fatal() {
        let body = r#"{"code": 4011, "message": "unsupported pair"}"#;
        let err = parse_route_body(body).unwrap_err();
        assert!(err.to_string().contains("4011"));
    }

    #[test]
    fn html_challenge_is_fatal() {
        let body = "<html><body>Checking your browser before accessing</body></html>";
        let err = parse_route_body(body).unwrap_err();
        assert!(err.to_string().contains("challenge"));
        assert!(parse_build_body(body).is_err());
    }

    #[test]
    fn build_parses_calldata_and_value() {
        let built = parse_build_body(BUILD_OK).unwrap();
        assert_eq!(built.calldata, "0xdeadbeef".parse::<Bytes>().unwrap());
        assert_eq!(built.value, U256::ZERO);
        assert_eq!(built.amount_out, Some(U256::from(3_099_000_000u64)));
    }

    #[test]
    fn build_accepts_encoded_swap_data_alias() {
        let body = r#"{
            "code": 0,
            "data": {
                "routerAddress": "0x6131B5fae19EA4f9D964eAc0408E4408b66337b5",
                "encodedSwapData": "0x1234",
                "value": "0x0"
            }
        }"#;
        let built = parse_build_body(body).unwrap();
        assert_eq!(built.calldata, "0x1234".parse::<Bytes>().unwrap());
        assert_eq!(built.amount_out, None);
    }

    #[test]
    fn router_mismatch_between_route_and_build() {
        let quote = parse_route_body(ROUTE_OK).unwrap();
        let other: Address = "0x0000000000000000000000000000000000000bad".parse().unwrap();
        let err = check_router_consistency(quote.router, other).unwrap_err();
        assert!(matches!(err, KeeperError::RouterMismatch { .. }));
        assert!(check_router_consistency(quote.router, quote.router).is_ok());
    }
}
