//! Parachute: sweep resting brackets and flatten the position.

use crate::error::DispatchError;
use crate::exchange::{OpenOrder, OrderIntent, OrderKind, PositionSnapshot, Side, TimeInForce};
use crate::signal::Action;
use crate::strategy::normalizer::PriceNormalizer;
use rust_decimal::Decimal;
use serde::Serialize;

/// What a close signal turns into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParachutePlan {
    /// Resting order ids to cancel, submitted first
    pub cancellations: Vec<u64>,
    /// Reduce-only IOC order flattening the position, if one is open on the signalled side
    pub close_order: Option<OrderIntent>,
}

/// Computes cancellations and the closing order for `close_long` / `close_short`.
#[derive(Debug, Clone)]
pub struct PositionReconciler {
    normalizer: PriceNormalizer,
    slippage: Decimal,
}

impl PositionReconciler {
    pub fn new(normalizer: PriceNormalizer, slippage: Decimal) -> Self {
        Self {
            normalizer,
            slippage,
        }
    }

    pub fn reconcile(
        &self,
        action: Action,
        symbol: &str,
        reference_price: Decimal,
        open_orders: &[OpenOrder],
        position: &PositionSnapshot,
    ) -> Result<ParachutePlan, DispatchError> {
        let cancellations = Self::sweep(symbol, open_orders);
        let close_order = self.close_order(action, symbol, reference_price, position)?;

        Ok(ParachutePlan {
            cancellations,
            close_order,
        })
    }

    /// Every resting order on `symbol`, whatever its side or purpose.
    pub fn sweep(symbol: &str, open_orders: &[OpenOrder]) -> Vec<u64> {
        open_orders
            .iter()
            .filter(|o| o.symbol == symbol)
            .map(|o| o.order_id)
            .collect()
    }

    /// Closing order for the position, or `None` when the position is not on the signalled side.
    pub fn close_order(
        &self,
        action: Action,
        symbol: &str,
        reference_price: Decimal,
        position: &PositionSnapshot,
    ) -> Result<Option<OrderIntent>, DispatchError> {
        if position.symbol != symbol {
            return Ok(None);
        }

        let matches_action = match action {
            Action::CloseLong => position.szi > Decimal::ZERO,
            Action::CloseShort => position.szi < Decimal::ZERO,
            Action::Buy | Action::Sell => false,
        };
        if !matches_action {
            return Ok(None);
        }

        let side = Side::from_is_buy(position.szi < Decimal::ZERO);
        let reference = self.normalizer.normalize_field(reference_price, "price")?;
        let offset = if side.is_buy() {
            self.slippage
        } else {
            -self.slippage
        };
        let limit = self.normalizer.bump(reference, offset, "price")?;

        Ok(Some(OrderIntent {
            side,
            size: position.szi.abs(),
            limit_price: limit.value(),
            trigger_price: None,
            time_in_force: TimeInForce::Ioc,
            reduce_only: true,
            kind: OrderKind::Limit,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::normalizer::PrecisionPolicy;
    use rust_decimal_macros::dec;

    fn reconciler() -> PositionReconciler {
        PositionReconciler::new(
            PriceNormalizer::new(PrecisionPolicy::SignificantFigures(5)),
            dec!(0.10),
        )
    }

    fn orders() -> Vec<OpenOrder> {
        vec![
            OpenOrder::new(101, "HYPE"),
            OpenOrder::new(102, "BTC"),
            OpenOrder::new(103, "HYPE"),
        ]
    }

    #[test]
    fn test_close_long_sells_exact_position_below_reference() {
        let plan = reconciler()
            .reconcile(
                Action::CloseLong,
                "HYPE",
                dec!(25.5),
                &orders(),
                &PositionSnapshot::new("HYPE", dec!(39.2)),
            )
            .unwrap();

        assert_eq!(plan.cancellations, vec![101, 103]);
        let close = plan.close_order.unwrap();
        assert_eq!(close.side, Side::Sell);
        assert_eq!(close.size, dec!(39.2));
        assert_eq!(close.limit_price, dec!(22.95));
        assert_eq!(close.time_in_force, TimeInForce::Ioc);
        assert!(close.reduce_only);
    }

    #[test]
    fn test_close_short_buys_above_reference() {
        let plan = reconciler()
            .reconcile(
                Action::CloseShort,
                "HYPE",
                dec!(25.5),
                &[],
                &PositionSnapshot::new("HYPE", dec!(-12.5)),
            )
            .unwrap();

        assert!(plan.cancellations.is_empty());
        let close = plan.close_order.unwrap();
        assert_eq!(close.side, Side::Buy);
        assert_eq!(close.size, dec!(12.5));
        assert_eq!(close.limit_price, dec!(28.05));
    }

    #[test]
    fn test_close_long_against_flat_or_short_still_sweeps() {
        for szi in [dec!(0), dec!(-4)] {
            let plan = reconciler()
                .reconcile(
                    Action::CloseLong,
                    "HYPE",
                    dec!(25.5),
                    &orders(),
                    &PositionSnapshot::new("HYPE", szi),
                )
                .unwrap();
            assert!(plan.close_order.is_none());
            assert_eq!(plan.cancellations, vec![101, 103]);
        }
    }

    #[test]
    fn test_close_short_against_long_is_noop() {
        let plan = reconciler()
            .reconcile(
                Action::CloseShort,
                "HYPE",
                dec!(25.5),
                &[],
                &PositionSnapshot::new("HYPE", dec!(4)),
            )
            .unwrap();
        assert_eq!(plan.close_order, None);
    }

    #[test]
    fn test_position_on_other_symbol_is_ignored() {
        let close = reconciler()
            .close_order(
                Action::CloseLong,
                "HYPE",
                dec!(25.5),
                &PositionSnapshot::new("BTC", dec!(1)),
            )
            .unwrap();
        assert!(close.is_none());
    }

    #[test]
    fn test_invalid_reference_price_fails_only_when_closing() {
        let r = reconciler();
        let flat = PositionSnapshot::flat("HYPE");
        assert!(r.close_order(Action::CloseLong, "HYPE", dec!(0), &flat).unwrap().is_none());

        let long = PositionSnapshot::new("HYPE", dec!(1));
        assert!(matches!(
            r.close_order(Action::CloseLong, "HYPE", dec!(0), &long),
            Err(DispatchError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_close_limit_is_strictly_beyond_reference_at_coarse_precision() {
        let coarse = PositionReconciler::new(
            PriceNormalizer::new(PrecisionPolicy::DecimalPlaces(4)),
            dec!(0.10),
        );

        let sell = coarse
            .close_order(Action::CloseLong, "HYPE", dec!(0.0002), &PositionSnapshot::new("HYPE", dec!(5)))
            .unwrap()
            .unwrap();
        assert_eq!(sell.limit_price, dec!(0.0001));

        let buy = coarse
            .close_order(Action::CloseShort, "HYPE", dec!(0.0002), &PositionSnapshot::new("HYPE", dec!(-5)))
            .unwrap()
            .unwrap();
        assert_eq!(buy.limit_price, dec!(0.0003));
    }
}
