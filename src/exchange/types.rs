//! Venue-agnostic order and account types shared by the strategy and the adapters.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn from_is_buy(is_buy: bool) -> Self {
        if is_buy {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Time in force for limit orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Immediate or cancel
    Ioc,
    /// Add liquidity only (post only, rejected instead of crossing)
    Alo,
    /// Good till cancel; rests as a trigger until activated
    Gtc,
}

/// Whether a trigger protects (stop-loss) or realises (take-profit) a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TpSl {
    Tp,
    Sl,
}

/// Order type specification passed to [`super::TradingVenue::place_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderTypeSpec {
    Limit {
        tif: TimeInForce,
    },
    Trigger {
        trigger_price: Decimal,
        is_market: bool,
        tpsl: TpSl,
    },
}

/// How an intent reaches the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OrderKind {
    /// Aggressive IOC order; the limit price is only a reference for the slippage bound.
    Market,
    /// Resting or IOC limit order.
    Limit,
    /// Activates once the trigger price is crossed.
    Trigger { is_market: bool, tpsl: TpSl },
}

/// One order computed by the bracket builder or the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntent {
    pub side: Side,
    pub size: Decimal,
    pub limit_price: Decimal,
    pub trigger_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub reduce_only: bool,
    pub kind: OrderKind,
}

impl OrderIntent {
    pub fn is_buy(&self) -> bool {
        self.side.is_buy()
    }

    /// Venue order type for non-market intents.
    pub fn order_type(&self) -> OrderTypeSpec {
        match (self.kind, self.trigger_price) {
            (OrderKind::Trigger { is_market, tpsl }, Some(trigger_price)) => {
                OrderTypeSpec::Trigger {
                    trigger_price,
                    is_market,
                    tpsl,
                }
            }
            _ => OrderTypeSpec::Limit {
                tif: self.time_in_force,
            },
        }
    }
}

/// A resting order as reported by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub order_id: u64,
    pub symbol: String,
    pub side: Option<Side>,
    pub limit_price: Option<Decimal>,
    pub size: Option<Decimal>,
}

impl OpenOrder {
    pub fn new(order_id: u64, symbol: impl Into<String>) -> Self {
        Self {
            order_id,
            symbol: symbol.into(),
            side: None,
            limit_price: None,
            size: None,
        }
    }
}

/// Point-in-time copy of one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    /// Signed size: positive long, negative short
    pub szi: Decimal,
}

impl PositionSnapshot {
    pub fn new(symbol: impl Into<String>, szi: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            szi,
        }
    }

    pub fn flat(symbol: impl Into<String>) -> Self {
        Self::new(symbol, Decimal::ZERO)
    }

    /// Select the position for `symbol`, treating absence as flat.
    pub fn for_symbol(positions: &[PositionSnapshot], symbol: &str) -> Self {
        positions
            .iter()
            .find(|p| p.symbol == symbol)
            .cloned()
            .unwrap_or_else(|| Self::flat(symbol))
    }
}

/// Venue state of an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum OrderStatus {
    Resting {
        oid: u64,
    },
    Filled {
        oid: u64,
        total_size: Decimal,
        average_price: Decimal,
    },
    /// Trigger accepted and waiting for its price
    WaitingForTrigger,
    /// Accepted without further detail
    Success,
}

/// Outcome of an accepted order placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderResult {
    pub status: OrderStatus,
}

impl OrderResult {
    pub fn oid(&self) -> Option<u64> {
        match self.status {
            OrderStatus::Resting { oid } | OrderStatus::Filled { oid, .. } => Some(oid),
            _ => None,
        }
    }
}

/// Outcome of an accepted cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelResult {
    pub order_id: u64,
}
