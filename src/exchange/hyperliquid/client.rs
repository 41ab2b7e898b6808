//! Hyperliquid REST API client.
//!
//! Signs and submits exchange actions with an agent key, optionally on behalf
//! of a vault or sub-account, and reads open orders and positions through the
//! info endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::signing::AgentSigner;
use super::types::*;
use crate::config::Config;
use crate::exchange::traits::{TradingVenue, Venue};
use crate::exchange::types::{
    CancelResult, OpenOrder, OrderResult, OrderStatus, OrderTypeSpec, PositionSnapshot, Side,
    TimeInForce, TpSl,
};
use crate::utils::decimal::{round_to_precision, round_to_significant_figures, to_wire_string};

/// Significant figures Hyperliquid accepts on perp prices.
const PRICE_SIGNIFICANT_FIGURES: u32 = 5;

/// Maximum price decimals for perps, before subtracting the asset's size decimals.
const MAX_PERP_DECIMALS: u32 = 6;

/// Hyperliquid API client for trading one account.
#[derive(Debug)]
pub struct HyperliquidClient {
    client: Client,
    base_url: String,
    signer: AgentSigner,
    vault_address: Option<String>,
    market_slippage: Decimal,
    assets: HashMap<String, AssetInfo>,
    last_nonce: AtomicU64,
}

impl HyperliquidClient {
    /// Build the client from configuration and load the asset universe.
    ///
    /// Fails if the agent key is unusable, the venue is unreachable, or the
    /// configured coin is not listed.
    pub async fn connect(config: &Config) -> Result<Self> {
        let signer = AgentSigner::from_hex(&config.credentials.agent_secret_key, !config.venue.testnet)?;
        let mut client = Self::with_base_url(
            config.api_url(),
            signer,
            config.credentials.vault_address.clone(),
            config.execution.market_slippage,
            Duration::from_secs(config.venue.request_timeout_secs),
        )?;

        client.load_meta().await?;
        let asset = client.asset(&config.venue.coin)?;

        info!(
            agent = %client.signer.address(),
            coin = %config.venue.coin,
            asset_index = asset.index,
            sz_decimals = asset.sz_decimals,
            "Connected to Hyperliquid"
        );
        Ok(client)
    }

    /// Create a client against a custom base URL, without loading metadata.
    pub fn with_base_url(
        base_url: &str,
        signer: AgentSigner,
        vault_address: Option<String>,
        market_slippage: Decimal,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
            vault_address,
            market_slippage,
            assets: HashMap::new(),
            last_nonce: AtomicU64::new(0),
        })
    }

    /// Address of the agent wallet signing actions.
    pub fn agent_address(&self) -> &str {
        self.signer.address()
    }

    /// Fetch the perpetuals universe and index it by coin name.
    #[instrument(skip(self), name = "hl_load_meta")]
    pub async fn load_meta(&mut self) -> Result<()> {
        let meta: Meta = self.post_info(&InfoRequest::Meta, "meta").await?;

        self.assets = meta
            .universe
            .iter()
            .enumerate()
            .map(|(index, asset)| {
                (
                    asset.name.clone(),
                    AssetInfo {
                        index: index as u32,
                        sz_decimals: asset.sz_decimals,
                    },
                )
            })
            .collect();

        debug!("Loaded {} assets from Hyperliquid", self.assets.len());
        Ok(())
    }

    fn asset(&self, symbol: &str) -> Result<AssetInfo> {
        self.assets
            .get(symbol)
            .copied()
            .with_context(|| format!("Unknown Hyperliquid asset: {symbol}"))
    }

    /// Aggressive limit price for a market order: `price * (1 ± slippage)`,
    /// rounded to 5 significant figures and then to the asset's price decimals.
    pub fn slippage_price(&self, asset: AssetInfo, is_buy: bool, price: Decimal) -> Result<Decimal> {
        let factor = if is_buy {
            Decimal::ONE + self.market_slippage
        } else {
            Decimal::ONE - self.market_slippage
        };
        let px = price
            .checked_mul(factor)
            .and_then(|px| round_to_significant_figures(px, PRICE_SIGNIFICANT_FIGURES))
            .with_context(|| format!("Cannot derive a slippage price from {price}"))?;
        Ok(round_to_precision(
            px,
            MAX_PERP_DECIMALS.saturating_sub(asset.sz_decimals),
        ))
    }

    /// Millisecond timestamp nonce, strictly increasing per client.
    fn next_nonce(&self) -> u64 {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut last = self.last_nonce.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .last_nonce
                .compare_exchange(last, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }

    async fn post_info<T: DeserializeOwned>(&self, request: &InfoRequest, what: &str) -> Result<T> {
        let url = format!("{}/info", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to send {what} request"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Hyperliquid API error {}: {}", status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {what} response"))
    }

    /// Sign and submit an action; returns the `response` payload of an "ok" envelope.
    async fn post_exchange<A: Serialize>(&self, action: &A, what: &str) -> Result<Value> {
        let url = format!("{}/exchange", self.base_url);
        let nonce = self.next_nonce();
        let vault_address = self.vault_address.as_deref();
        let signature = self.signer.sign_l1_action(action, vault_address, nonce)?;

        let request = ExchangeRequest {
            action,
            nonce,
            signature,
            vault_address,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {what} action"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Hyperliquid API error {}: {}", status, body);
        }

        let envelope: ExchangeResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {what} response"))?;

        if envelope.status != "ok" {
            anyhow::bail!("Hyperliquid rejected {what}: {}", describe(&envelope.response));
        }
        Ok(envelope.response)
    }

    async fn submit_order(&self, order: OrderWire) -> Result<OrderResult> {
        let action = OrderAction::single(order);
        let response = self.post_exchange(&action, "order").await?;
        parse_order_status(&response)
    }
}

#[async_trait]
impl TradingVenue for HyperliquidClient {
    fn venue(&self) -> Venue {
        Venue::Hyperliquid
    }

    #[instrument(skip(self), name = "hl_market_order")]
    async fn place_market_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        reference_price: Decimal,
    ) -> Result<OrderResult> {
        let asset = self.asset(symbol)?;
        let limit_price = self.slippage_price(asset, is_buy, reference_price)?;
        debug!(%limit_price, "Market order bounded by slippage price");

        self.submit_order(OrderWire {
            a: asset.index,
            b: is_buy,
            p: to_wire_string(limit_price),
            s: to_wire_string(size),
            r: false,
            t: order_type_wire(OrderTypeSpec::Limit {
                tif: TimeInForce::Ioc,
            }),
        })
        .await
    }

    #[instrument(skip(self), name = "hl_place_order")]
    async fn place_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        limit_price: Decimal,
        order_type: OrderTypeSpec,
        reduce_only: bool,
    ) -> Result<OrderResult> {
        let asset = self.asset(symbol)?;

        self.submit_order(OrderWire {
            a: asset.index,
            b: is_buy,
            p: to_wire_string(limit_price),
            s: to_wire_string(size),
            r: reduce_only,
            t: order_type_wire(order_type),
        })
        .await
    }

    #[instrument(skip(self), name = "hl_cancel_order")]
    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<CancelResult> {
        let asset = self.asset(symbol)?;
        let action = CancelAction::single(asset.index, order_id);
        let response = self.post_exchange(&action, "cancel").await?;

        match first_status(&response)? {
            Value::String(s) if s == "success" => Ok(CancelResult { order_id }),
            other => match other.get("error").and_then(Value::as_str) {
                Some(err) => anyhow::bail!("Cancel of {order_id} rejected: {err}"),
                None => anyhow::bail!("Unexpected cancel status: {other}"),
            },
        }
    }

    #[instrument(skip(self), name = "hl_open_orders")]
    async fn list_open_orders(&self, account: &str) -> Result<Vec<OpenOrder>> {
        let request = InfoRequest::OpenOrders {
            user: account.to_string(),
        };
        let entries: Vec<OpenOrderEntry> = self.post_info(&request, "openOrders").await?;

        debug!("Fetched {} open orders", entries.len());
        Ok(entries.into_iter().map(OpenOrder::from).collect())
    }

    #[instrument(skip(self), name = "hl_positions")]
    async fn get_position_state(&self, account: &str) -> Result<Vec<PositionSnapshot>> {
        let request = InfoRequest::ClearinghouseState {
            user: account.to_string(),
        };
        let state: ClearinghouseState = self.post_info(&request, "clearinghouseState").await?;

        Ok(state
            .asset_positions
            .into_iter()
            .map(|p| PositionSnapshot::new(p.position.coin, p.position.szi))
            .collect())
    }
}

impl From<OpenOrderEntry> for OpenOrder {
    fn from(entry: OpenOrderEntry) -> Self {
        let side = match entry.side.as_str() {
            "B" => Some(Side::Buy),
            "A" => Some(Side::Sell),
            _ => None,
        };
        OpenOrder {
            order_id: entry.oid,
            symbol: entry.coin,
            side,
            limit_price: Some(entry.limit_px),
            size: Some(entry.sz),
        }
    }
}

fn order_type_wire(order_type: OrderTypeSpec) -> OrderTypeWire {
    match order_type {
        OrderTypeSpec::Limit { tif } => OrderTypeWire {
            limit: Some(LimitWire {
                tif: match tif {
                    TimeInForce::Ioc => "Ioc",
                    TimeInForce::Alo => "Alo",
                    TimeInForce::Gtc => "Gtc",
                },
            }),
            trigger: None,
        },
        OrderTypeSpec::Trigger {
            trigger_price,
            is_market,
            tpsl,
        } => OrderTypeWire {
            limit: None,
            trigger: Some(TriggerWire {
                is_market,
                trigger_px: to_wire_string(trigger_price),
                tpsl: match tpsl {
                    TpSl::Tp => "tp",
                    TpSl::Sl => "sl",
                },
            }),
        },
    }
}

fn describe(response: &Value) -> String {
    match response {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn first_status(response: &Value) -> Result<&Value> {
    response
        .pointer("/data/statuses/0")
        .with_context(|| format!("Response carries no status: {response}"))
}

/// Map the first entry of `data.statuses` to an [`OrderResult`]; per-order errors become `Err`.
fn parse_order_status(response: &Value) -> Result<OrderResult> {
    let status = first_status(response)?;

    if let Some(err) = status.get("error").and_then(Value::as_str) {
        anyhow::bail!("Order rejected: {err}");
    }

    if let Some(resting) = status.get("resting") {
        let oid = resting
            .get("oid")
            .and_then(Value::as_u64)
            .context("Resting status without oid")?;
        return Ok(OrderResult {
            status: OrderStatus::Resting { oid },
        });
    }

    if let Some(filled) = status.get("filled") {
        let oid = filled
            .get("oid")
            .and_then(Value::as_u64)
            .context("Filled status without oid")?;
        let total_size = decimal_field(filled, "totalSz")?;
        let average_price = decimal_field(filled, "avgPx")?;
        return Ok(OrderResult {
            status: OrderStatus::Filled {
                oid,
                total_size,
                average_price,
            },
        });
    }

    match status.as_str() {
        Some("waitingForTrigger") => Ok(OrderResult {
            status: OrderStatus::WaitingForTrigger,
        }),
        Some("success") => Ok(OrderResult {
            status: OrderStatus::Success,
        }),
        _ => anyhow::bail!("Unexpected order status: {status}"),
    }
}

fn decimal_field(value: &Value, field: &str) -> Result<Decimal> {
    value
        .get(field)
        .and_then(Value::as_str)
        .with_context(|| format!("Missing {field}"))?
        .parse()
        .with_context(|| format!("Invalid {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

    fn client(base_url: &str) -> HyperliquidClient {
        let signer = AgentSigner::from_hex(KEY_ONE, false).unwrap();
        HyperliquidClient::with_base_url(
            base_url,
            signer,
            None,
            dec!(0.05),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    async fn mount_meta(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/info"))
            .and(body_partial_json(json!({"type": "meta"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "universe": [
                    {"name": "BTC", "szDecimals": 5, "maxLeverage": 40},
                    {"name": "ETH", "szDecimals": 4, "maxLeverage": 25},
                    {"name": "HYPE", "szDecimals": 2, "maxLeverage": 10}
                ]
            })))
            .mount(server)
            .await;
    }

    async fn connected(server: &MockServer) -> HyperliquidClient {
        mount_meta(server).await;
        let mut client = client(&server.uri());
        client.load_meta().await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_load_meta_indexes_universe() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        assert_eq!(
            client.asset("HYPE").unwrap(),
            AssetInfo {
                index: 2,
                sz_decimals: 2
            }
        );
        assert!(client.asset("DOGE").is_err());
    }

    #[tokio::test]
    async fn test_slippage_price() {
        let server = MockServer::start().await;
        let client = connected(&server).await;
        let hype = client.asset("HYPE").unwrap();

        // 25.123 * 1.05 = 26.37915 -> 26.379 (5 sf) -> 26.379 (4 dp)
        assert_eq!(client.slippage_price(hype, true, dec!(25.123)).unwrap(), dec!(26.379));
        // 25.123 * 0.95 = 23.86685 -> 23.867
        assert_eq!(client.slippage_price(hype, false, dec!(25.123)).unwrap(), dec!(23.867));

        let btc = client.asset("BTC").unwrap();
        // 43210.7 * 1.05 = 45371.235 -> 45371 (5 sf) -> 45371 (1 dp)
        assert_eq!(client.slippage_price(btc, true, dec!(43210.7)).unwrap(), dec!(45371));
    }

    #[tokio::test]
    async fn test_slippage_price_overflow_is_an_error() {
        let server = MockServer::start().await;
        let client = connected(&server).await;
        let hype = client.asset("HYPE").unwrap();

        assert!(client
            .slippage_price(hype, true, dec!(78000000000000000000000000000))
            .is_err());
    }

    #[tokio::test]
    async fn test_list_open_orders() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/info"))
            .and(body_partial_json(json!({"type": "openOrders", "user": "0xabc"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"coin": "HYPE", "limitPx": "22.5", "oid": 11, "side": "A", "sz": "4.0", "timestamp": 1},
                {"coin": "BTC", "limitPx": "40000", "oid": 12, "side": "B", "sz": "0.01", "timestamp": 2}
            ])))
            .mount(&server)
            .await;

        let orders = client(&server.uri()).list_open_orders("0xabc").await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].order_id, 11);
        assert_eq!(orders[0].side, Some(Side::Sell));
        assert_eq!(orders[1].symbol, "BTC");
        assert_eq!(orders[1].limit_price, Some(dec!(40000)));
    }

    #[tokio::test]
    async fn test_get_position_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/info"))
            .and(body_partial_json(json!({"type": "clearinghouseState"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "assetPositions": [
                    {"position": {"coin": "HYPE", "szi": "-3.5", "entryPx": "25.0"}, "type": "oneWay"}
                ]
            })))
            .mount(&server)
            .await;

        let positions = client(&server.uri()).get_position_state("0xabc").await.unwrap();
        assert_eq!(positions, vec![PositionSnapshot::new("HYPE", dec!(-3.5))]);
    }

    #[tokio::test]
    async fn test_info_http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client(&server.uri()).list_open_orders("0xabc").await.unwrap_err();
        assert!(format!("{err:#}").contains("502"));
    }

    #[tokio::test]
    async fn test_place_trigger_order_posts_signed_action() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        Mock::given(method("POST"))
            .and(path("/exchange"))
            .and(body_partial_json(json!({
                "action": {
                    "type": "order",
                    "orders": [{
                        "a": 2, "b": false, "p": "8.55", "s": "2", "r": true,
                        "t": {"trigger": {"isMarket": true, "triggerPx": "9.5", "tpsl": "sl"}}
                    }],
                    "grouping": "na"
                },
                "vaultAddress": null
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "response": {"type": "order", "data": {"statuses": [{"resting": {"oid": 77}}]}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client
            .place_order(
                "HYPE",
                false,
                dec!(2),
                dec!(8.55),
                OrderTypeSpec::Trigger {
                    trigger_price: dec!(9.5),
                    is_market: true,
                    tpsl: TpSl::Sl,
                },
                true,
            )
            .await
            .unwrap();
        assert_eq!(result.oid(), Some(77));
    }

    #[tokio::test]
    async fn test_market_order_fill() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        Mock::given(method("POST"))
            .and(path("/exchange"))
            .and(body_partial_json(json!({
                "action": {"orders": [{"a": 2, "b": true, "p": "26.379", "r": false, "t": {"limit": {"tif": "Ioc"}}}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "response": {"type": "order", "data": {"statuses": [
                    {"filled": {"totalSz": "3.0", "avgPx": "25.2", "oid": 5}}
                ]}}
            })))
            .mount(&server)
            .await;

        let result = client
            .place_market_order("HYPE", true, dec!(3), dec!(25.123))
            .await
            .unwrap();
        assert_eq!(
            result.status,
            OrderStatus::Filled {
                oid: 5,
                total_size: dec!(3.0),
                average_price: dec!(25.2)
            }
        );
    }

    #[tokio::test]
    async fn test_order_level_error_is_err() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        Mock::given(method("POST"))
            .and(path("/exchange"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "response": {"type": "order", "data": {"statuses": [
                    {"error": "Order could not immediately match against any resting orders."}
                ]}}
            })))
            .mount(&server)
            .await;

        let err = client
            .place_market_order("HYPE", true, dec!(3), dec!(25))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("could not immediately match"));
    }

    #[tokio::test]
    async fn test_envelope_error_is_err() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        Mock::given(method("POST"))
            .and(path("/exchange"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "err",
                "response": "User or API Wallet does not exist."
            })))
            .mount(&server)
            .await;

        let err = client.cancel_order("HYPE", 9).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_cancel_order_success() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        Mock::given(method("POST"))
            .and(path("/exchange"))
            .and(body_partial_json(json!({"action": {"type": "cancel", "cancels": [{"a": 2, "o": 9}]}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "response": {"type": "cancel", "data": {"statuses": ["success"]}}
            })))
            .mount(&server)
            .await;

        assert_eq!(
            client.cancel_order("HYPE", 9).await.unwrap(),
            CancelResult { order_id: 9 }
        );
    }

    #[tokio::test]
    async fn test_unknown_symbol_fails_before_sending() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        assert!(client.cancel_order("DOGE", 1).await.is_err());
        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| r.url.path() == "/info"));
    }

    #[test]
    fn test_nonces_strictly_increase() {
        let client = client("http://localhost");
        let a = client.next_nonce();
        let b = client.next_nonce();
        assert!(b > a);
    }

    #[test]
    fn test_parse_waiting_for_trigger() {
        let response = json!({"type": "order", "data": {"statuses": ["waitingForTrigger"]}});
        assert_eq!(
            parse_order_status(&response).unwrap().status,
            OrderStatus::WaitingForTrigger
        );
        assert!(parse_order_status(&json!({"type": "order"})).is_err());
    }
}
