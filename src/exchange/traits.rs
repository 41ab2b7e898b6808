//! The narrow trading surface the dispatcher depends on.
//!
//! Implemented by the live Hyperliquid client and by the paper venue; the
//! strategy layer never sees anything venue specific beyond this trait.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;

use super::types::{CancelResult, OpenOrder, OrderResult, OrderTypeSpec, PositionSnapshot};

/// Venue identifier, for logging and the liveness payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Venue {
    Hyperliquid,
    Paper,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::Hyperliquid => write!(f, "Hyperliquid"),
            Venue::Paper => write!(f, "Paper"),
        }
    }
}

/// Order placement, cancellation and account queries for one trading identity.
///
/// Every call is a blocking step from the dispatcher's point of view: it is
/// awaited before the next one starts. Transport timeouts belong to the
/// implementation; callers never retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradingVenue: Send + Sync {
    /// Returns the venue identifier.
    fn venue(&self) -> Venue;

    /// Aggressive order bounded by `reference_price` plus the venue's slippage allowance.
    async fn place_market_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        reference_price: Decimal,
    ) -> anyhow::Result<OrderResult>;

    /// Limit or trigger order.
    async fn place_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        limit_price: Decimal,
        order_type: OrderTypeSpec,
        reduce_only: bool,
    ) -> anyhow::Result<OrderResult>;

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> anyhow::Result<CancelResult>;

    /// All resting orders of `account`, across symbols.
    async fn list_open_orders(&self, account: &str) -> anyhow::Result<Vec<OpenOrder>>;

    /// All open positions of `account`, across symbols.
    async fn get_position_state(&self, account: &str) -> anyhow::Result<Vec<PositionSnapshot>>;
}
