//! Type definitions for Hyperliquid API requests and responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Request type for Hyperliquid info endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum InfoRequest {
    /// Perpetuals universe (asset index order, size decimals).
    #[serde(rename = "meta")]
    Meta,

    /// Resting orders of a user.
    #[serde(rename = "openOrders")]
    OpenOrders { user: String },

    /// Margin summary and positions of a user.
    #[serde(rename = "clearinghouseState")]
    ClearinghouseState { user: String },
}

/// Universe metadata for perpetuals.
#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub universe: Vec<AssetMeta>,
}

/// Metadata for a single asset in the universe.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    /// Asset name (e.g., "BTC", "HYPE")
    pub name: String,
    /// Size decimal precision
    pub sz_decimals: u32,
    /// Maximum allowed leverage
    #[serde(default)]
    pub max_leverage: u32,
    /// Delisted assets stay in the universe to keep indices stable
    #[serde(default)]
    pub is_delisted: bool,
}

/// Asset as addressed by exchange actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetInfo {
    /// Position in the universe; the `a` field of order wires
    pub index: u32,
    pub sz_decimals: u32,
}

/// Entry of the `openOrders` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrderEntry {
    pub coin: String,
    pub oid: u64,
    /// "B" for bids, "A" for asks
    pub side: String,
    #[serde(deserialize_with = "deserialize_decimal_str")]
    pub limit_px: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_str")]
    pub sz: Decimal,
    #[serde(default)]
    pub timestamp: i64,
}

/// `clearinghouseState` response (only the parts the trader reads).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseState {
    #[serde(default)]
    pub asset_positions: Vec<AssetPosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPosition {
    pub position: PositionData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionData {
    pub coin: String,
    /// Signed size
    #[serde(deserialize_with = "deserialize_decimal_str")]
    pub szi: Decimal,
    #[serde(default, deserialize_with = "deserialize_decimal_str_option_null")]
    pub entry_px: Option<Decimal>,
}

// ==================== Exchange action wires ====================
//
// Field order matters: actions are hashed as MessagePack maps in declaration order.

/// `order` action.
#[derive(Debug, Clone, Serialize)]
pub struct OrderAction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub orders: Vec<OrderWire>,
    pub grouping: &'static str,
}

impl OrderAction {
    pub fn single(order: OrderWire) -> Self {
        Self {
            kind: "order",
            orders: vec![order],
            grouping: "na",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWire {
    /// Asset index
    pub a: u32,
    /// Is buy
    pub b: bool,
    /// Limit price
    pub p: String,
    /// Size
    pub s: String,
    /// Reduce only
    pub r: bool,
    /// Order type
    pub t: OrderTypeWire,
}

/// Exactly one of the two fields is set.
#[derive(Debug, Clone, Serialize)]
pub struct OrderTypeWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<LimitWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerWire>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LimitWire {
    /// "Alo", "Ioc" or "Gtc"
    pub tif: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerWire {
    pub is_market: bool,
    pub trigger_px: String,
    /// "tp" or "sl"
    pub tpsl: &'static str,
}

/// `cancel` action.
#[derive(Debug, Clone, Serialize)]
pub struct CancelAction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub cancels: Vec<CancelWire>,
}

impl CancelAction {
    pub fn single(asset: u32, oid: u64) -> Self {
        Self {
            kind: "cancel",
            cancels: vec![CancelWire { a: asset, o: oid }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelWire {
    pub a: u32,
    pub o: u64,
}

/// ECDSA signature in the form the exchange endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureWire {
    pub r: String,
    pub s: String,
    pub v: u8,
}

/// Body posted to `/exchange`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest<'a, A: Serialize> {
    pub action: &'a A,
    pub nonce: u64,
    pub signature: SignatureWire,
    pub vault_address: Option<&'a str>,
}

/// Envelope of every `/exchange` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeResponse {
    /// "ok" or "err"
    pub status: String,
    /// Error message string on "err", typed payload on "ok"
    #[serde(default)]
    pub response: serde_json::Value,
}

// Custom deserializers for Hyperliquid's string-encoded decimals

fn deserialize_decimal_str<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse::<Decimal>().map_err(serde::de::Error::custom)
}

/// Deserializer that handles both null JSON values and missing fields.
fn deserialize_decimal_str_option_null<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<Option<String>> = Option::deserialize(deserializer)?;
    match opt {
        Some(Some(s)) if !s.is_empty() => s
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
