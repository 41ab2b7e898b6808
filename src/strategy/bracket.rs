//! Entry-with-bracket order construction.
//!
//! An entry signal becomes three intents that always share one size:
//! a market entry, a reduce-only stop-loss trigger and a reduce-only take-profit.

use crate::config::{ExecutionConfig, StopLossTrigger, TakeProfitMode};
use crate::error::DispatchError;
use crate::exchange::{OrderIntent, OrderKind, Side, TimeInForce, TpSl};
use crate::signal::Signal;
use crate::strategy::normalizer::{NormalizedPrice, PriceNormalizer};
use crate::utils::decimal::round_to_precision;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

/// The three orders of an entry, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketOrders {
    pub entry: OrderIntent,
    pub stop_loss: OrderIntent,
    pub take_profit: OrderIntent,
}

/// Builds entry + stop-loss + take-profit intents from an entry signal.
#[derive(Debug, Clone)]
pub struct BracketBuilder {
    normalizer: PriceNormalizer,
    notional_usd: Decimal,
    size_decimals: u32,
    slippage: Decimal,
    stop_loss_trigger: StopLossTrigger,
    take_profit_mode: TakeProfitMode,
    bump_maker_take_profit: bool,
}

impl BracketBuilder {
    pub fn new(normalizer: PriceNormalizer, config: &ExecutionConfig) -> Self {
        Self {
            normalizer,
            notional_usd: config.notional_usd,
            size_decimals: config.size_decimals,
            slippage: config.bracket_slippage,
            stop_loss_trigger: config.stop_loss_trigger,
            take_profit_mode: config.take_profit_mode,
            bump_maker_take_profit: config.bump_maker_take_profit,
        }
    }

    pub fn build(&self, signal: &Signal, is_buy: bool) -> Result<BracketOrders, DispatchError> {
        let entry_price = self.normalizer.normalize_field(signal.price, "price")?;
        let stop_price = self
            .normalizer
            .normalize_field(signal.stop_loss()?, "stopLoss")?;
        let target_price = self
            .normalizer
            .normalize_field(signal.take_profit()?, "takeProfit")?;

        let size = self.size_for(signal.size, entry_price)?;
        let side = Side::from_is_buy(is_buy);
        let exit_side = side.opposite();

        let entry = OrderIntent {
            side,
            size,
            limit_price: entry_price.value(),
            trigger_price: None,
            time_in_force: TimeInForce::Ioc,
            reduce_only: false,
            kind: OrderKind::Market,
        };

        let stop_limit = self.marketable_limit(stop_price, exit_side, "stopLoss")?;
        let stop_loss = OrderIntent {
            side: exit_side,
            size,
            limit_price: stop_limit.value(),
            trigger_price: Some(stop_price.value()),
            time_in_force: TimeInForce::Gtc,
            reduce_only: true,
            kind: OrderKind::Trigger {
                is_market: self.stop_loss_trigger == StopLossTrigger::Market,
                tpsl: TpSl::Sl,
            },
        };

        let take_profit = match self.take_profit_mode {
            TakeProfitMode::Maker => {
                let limit = if self.bump_maker_take_profit {
                    self.marketable_limit(target_price, exit_side, "takeProfit")?
                } else {
                    target_price
                };
                OrderIntent {
                    side: exit_side,
                    size,
                    limit_price: limit.value(),
                    trigger_price: None,
                    time_in_force: TimeInForce::Alo,
                    reduce_only: true,
                    kind: OrderKind::Limit,
                }
            }
            TakeProfitMode::MarketTrigger => {
                let limit = self.marketable_limit(target_price, exit_side, "takeProfit")?;
                OrderIntent {
                    side: exit_side,
                    size,
                    limit_price: limit.value(),
                    trigger_price: Some(target_price.value()),
                    time_in_force: TimeInForce::Gtc,
                    reduce_only: true,
                    kind: OrderKind::Trigger {
                        is_market: true,
                        tpsl: TpSl::Tp,
                    },
                }
            }
        };

        debug!(
            action = %signal.action,
            %size,
            entry = %entry_price,
            stop_trigger = %stop_price,
            stop_limit = %stop_limit,
            take_profit = %take_profit.limit_price,
            "Bracket built"
        );

        Ok(BracketOrders {
            entry,
            stop_loss,
            take_profit,
        })
    }

    /// Explicit size wins; otherwise the notional target at the entry price.
    fn size_for(
        &self,
        explicit: Option<Decimal>,
        entry_price: NormalizedPrice,
    ) -> Result<Decimal, DispatchError> {
        let size = match explicit {
            Some(size) => size,
            None => {
                let raw = self
                    .notional_usd
                    .checked_div(entry_price.value())
                    .ok_or_else(|| {
                        DispatchError::InvalidSize(format!(
                            "notional {} at price {entry_price} overflows",
                            self.notional_usd
                        ))
                    })?;
                round_to_precision(raw, self.size_decimals)
            }
        };

        if size <= Decimal::ZERO {
            return Err(DispatchError::InvalidSize(format!(
                "size must be positive, got {size}"
            )));
        }
        Ok(size)
    }

    /// Limit beyond `trigger` in the fill direction of an order on `side`:
    /// sells rest below, buys above.
    fn marketable_limit(
        &self,
        trigger: NormalizedPrice,
        side: Side,
        field: &'static str,
    ) -> Result<NormalizedPrice, DispatchError> {
        let offset = match side {
            Side::Buy => self.slippage,
            Side::Sell => -self.slippage,
        };
        self.normalizer.bump(trigger, offset, field)
    }
}
