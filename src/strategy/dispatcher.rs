//! Signal dispatch state machine.
//!
//! `Received → Classified → {Reconciling | Building} → Submitting → Completed`,
//! with `Failed` reachable from every state before `Submitting`. Once submission
//! starts every step is attempted and its outcome recorded; a failed step never
//! stops the next one and nothing is rolled back or retried.

use crate::config::Config;
use crate::error::DispatchError;
use crate::exchange::{OrderIntent, OrderKind, PositionSnapshot, TradingVenue};
use crate::signal::{Action, ActionClass, Signal};
use crate::strategy::bracket::BracketBuilder;
use crate::strategy::normalizer::{PrecisionPolicy, PriceNormalizer};
use crate::strategy::parachute::PositionReconciler;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Lifecycle of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Received,
    Classified,
    Reconciling,
    Building,
    Submitting,
    Completed,
    Failed,
}

/// One submission of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "step")]
pub enum Step {
    Entry,
    StopLoss,
    TakeProfit,
    Cancel { order_id: u64 },
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Error,
}

/// Recorded outcome of one submission.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    #[serde(flatten)]
    pub step: Step,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<OrderIntent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    fn ok(step: Step, intent: Option<OrderIntent>, response: Option<Value>) -> Self {
        Self {
            step,
            status: StepStatus::Ok,
            intent,
            response,
            error: None,
        }
    }

    fn failed(step: Step, intent: Option<OrderIntent>, err: DispatchError) -> Self {
        Self {
            step,
            status: StepStatus::Error,
            intent,
            response: None,
            error: Some(err.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == StepStatus::Ok
    }
}

/// Result of a dispatch that reached `Completed`.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub action: Action,
    pub symbol: String,
    /// Position seen by a close dispatch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionSnapshot>,
    pub steps: Vec<StepOutcome>,
    pub states: Vec<DispatchState>,
}

impl DispatchReport {
    pub fn message(&self) -> String {
        let failed = self.failed_steps();
        let base = match self.action.class() {
            ActionClass::Entry { .. } => "Trade opened with SL/TP",
            ActionClass::Close => "Parachute executed",
        };
        if failed == 0 {
            base.to_string()
        } else {
            format!("{base} ({failed} of {} steps failed)", self.steps.len())
        }
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.is_ok()).count()
    }

    pub fn final_state(&self) -> DispatchState {
        self.states.last().copied().unwrap_or(DispatchState::Received)
    }
}

/// Tracks state transitions for logging and the report.
struct Lifecycle {
    states: Vec<DispatchState>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            states: vec![DispatchState::Received],
        }
    }

    fn advance(&mut self, next: DispatchState) {
        debug!(from = ?self.states.last(), to = ?next, "Dispatch transition");
        self.states.push(next);
    }

    fn fail(&mut self, err: DispatchError) -> DispatchError {
        self.advance(DispatchState::Failed);
        warn!(kind = err.kind(), error = %err, "Dispatch failed");
        err
    }
}

/// Routes one signal to the bracket builder or the reconciler and submits the result.
pub struct SignalDispatcher {
    venue: Arc<dyn TradingVenue>,
    symbol: String,
    account: String,
    normalizer: PriceNormalizer,
    builder: BracketBuilder,
    reconciler: PositionReconciler,
    refetch_position_before_close: bool,
}

impl SignalDispatcher {
    pub fn new(venue: Arc<dyn TradingVenue>, config: &Config) -> Self {
        let exec = &config.execution;
        let normalizer = PriceNormalizer::new(PrecisionPolicy::from_config(exec));
        Self {
            venue,
            symbol: config.venue.coin.clone(),
            account: config.credentials.sub_account_address.clone(),
            normalizer,
            builder: BracketBuilder::new(normalizer, exec),
            reconciler: PositionReconciler::new(normalizer, exec.bracket_slippage),
            refetch_position_before_close: exec.refetch_position_before_close,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn venue(&self) -> &Arc<dyn TradingVenue> {
        &self.venue
    }

    /// Decode a webhook body and dispatch it.
    pub async fn dispatch(&self, body: &[u8]) -> Result<DispatchReport, DispatchError> {
        let mut lifecycle = Lifecycle::new();
        let signal = Signal::from_json(body).map_err(|e| lifecycle.fail(e))?;
        self.run(signal, lifecycle).await
    }

    /// Dispatch an already decoded signal.
    pub async fn dispatch_signal(&self, signal: Signal) -> Result<DispatchReport, DispatchError> {
        self.run(signal, Lifecycle::new()).await
    }

    #[instrument(skip_all, fields(action = %signal.action, coin = %self.symbol))]
    async fn run(
        &self,
        signal: Signal,
        mut lifecycle: Lifecycle,
    ) -> Result<DispatchReport, DispatchError> {
        lifecycle.advance(DispatchState::Classified);
        info!(price = %signal.price, size = ?signal.size, "Signal received");

        // Every action references the chart price; reject it before touching the venue.
        if let Err(e) = self.normalizer.normalize_field(signal.price, "price") {
            return Err(lifecycle.fail(e));
        }

        match signal.action.class() {
            ActionClass::Entry { is_buy } => self.run_entry(signal, is_buy, lifecycle).await,
            ActionClass::Close => self.run_close(signal, lifecycle).await,
        }
    }

    async fn run_entry(
        &self,
        signal: Signal,
        is_buy: bool,
        mut lifecycle: Lifecycle,
    ) -> Result<DispatchReport, DispatchError> {
        lifecycle.advance(DispatchState::Building);
        let orders = self
            .builder
            .build(&signal, is_buy)
            .map_err(|e| lifecycle.fail(e))?;

        lifecycle.advance(DispatchState::Submitting);
        let mut steps = Vec::with_capacity(3);

        info!(size = %orders.entry.size, reference = %orders.entry.limit_price, "1. Placing market entry");
        steps.push(self.submit(Step::Entry, orders.entry).await);

        info!(
            trigger = ?orders.stop_loss.trigger_price,
            limit = %orders.stop_loss.limit_price,
            "2. Placing stop loss"
        );
        steps.push(self.submit(Step::StopLoss, orders.stop_loss).await);

        info!(limit = %orders.take_profit.limit_price, "3. Placing take profit");
        steps.push(self.submit(Step::TakeProfit, orders.take_profit).await);

        if !steps[0].is_ok() {
            warn!("Entry failed; bracket orders were still attempted");
        } else if !steps[1].is_ok() {
            error!("Stop loss placement failed: position is open WITHOUT protection");
        }

        lifecycle.advance(DispatchState::Completed);
        Ok(DispatchReport {
            action: signal.action,
            symbol: self.symbol.clone(),
            position: None,
            steps,
            states: lifecycle.states,
        })
    }

    async fn run_close(
        &self,
        signal: Signal,
        mut lifecycle: Lifecycle,
    ) -> Result<DispatchReport, DispatchError> {
        lifecycle.advance(DispatchState::Reconciling);

        let open_orders = match self.venue.list_open_orders(&self.account).await {
            Ok(orders) => orders,
            Err(e) => return Err(lifecycle.fail(DispatchError::adapter(&e))),
        };
        let positions = match self.venue.get_position_state(&self.account).await {
            Ok(positions) => positions,
            Err(e) => return Err(lifecycle.fail(DispatchError::adapter(&e))),
        };
        let position = PositionSnapshot::for_symbol(&positions, &self.symbol);

        let plan = self
            .reconciler
            .reconcile(
                signal.action,
                &self.symbol,
                signal.price,
                &open_orders,
                &position,
            )
            .map_err(|e| lifecycle.fail(e))?;

        lifecycle.advance(DispatchState::Submitting);
        let mut steps = Vec::with_capacity(plan.cancellations.len() + 1);

        info!(count = plan.cancellations.len(), "1. Sweeping pending SL/TP orders");
        for order_id in &plan.cancellations {
            steps.push(self.cancel(*order_id).await);
        }

        let close_order = if self.refetch_position_before_close && !plan.cancellations.is_empty() {
            self.refetch_close_order(&signal).await
        } else {
            Ok(plan.close_order)
        };

        match close_order {
            Ok(Some(intent)) => {
                info!(side = %intent.side, size = %intent.size, limit = %intent.limit_price, "2. Closing active position");
                steps.push(self.submit(Step::Close, intent).await);
            }
            Ok(None) => info!(szi = %position.szi, "2. No position on the signalled side; nothing to close"),
            Err(e) => {
                error!(error = %e, "2. Position re-fetch failed; close skipped");
                steps.push(StepOutcome::failed(Step::Close, None, e));
            }
        }

        lifecycle.advance(DispatchState::Completed);
        Ok(DispatchReport {
            action: signal.action,
            symbol: self.symbol.clone(),
            position: Some(position),
            steps,
            states: lifecycle.states,
        })
    }

    /// Re-read the position after the sweep so a bracket that filled meanwhile is accounted for.
    async fn refetch_close_order(&self, signal: &Signal) -> Result<Option<OrderIntent>, DispatchError> {
        let positions = self
            .venue
            .get_position_state(&self.account)
            .await
            .map_err(|e| DispatchError::adapter(&e))?;
        let position = PositionSnapshot::for_symbol(&positions, &self.symbol);
        debug!(szi = %position.szi, "Position re-fetched before close");
        self.reconciler
            .close_order(signal.action, &self.symbol, signal.price, &position)
    }

    async fn submit(&self, step: Step, intent: OrderIntent) -> StepOutcome {
        let result = match intent.kind {
            OrderKind::Market => {
                self.venue
                    .place_market_order(&self.symbol, intent.is_buy(), intent.size, intent.limit_price)
                    .await
            }
            OrderKind::Limit | OrderKind::Trigger { .. } => {
                self.venue
                    .place_order(
                        &self.symbol,
                        intent.is_buy(),
                        intent.size,
                        intent.limit_price,
                        intent.order_type(),
                        intent.reduce_only,
                    )
                    .await
            }
        };

        match result {
            Ok(res) => {
                info!(step = ?step, oid = ?res.oid(), "Order accepted");
                StepOutcome::ok(step, Some(intent), serde_json::to_value(&res).ok())
            }
            Err(e) => {
                error!(step = ?step, error = %format!("{e:#}"), "Order failed");
                StepOutcome::failed(step, Some(intent), DispatchError::adapter(&e))
            }
        }
    }

    async fn cancel(&self, order_id: u64) -> StepOutcome {
        let step = Step::Cancel { order_id };
        match self.venue.cancel_order(&self.symbol, order_id).await {
            Ok(res) => {
                debug!(order_id, "Order cancelled");
                StepOutcome::ok(step, None, serde_json::to_value(&res).ok())
            }
            Err(e) => {
                error!(order_id, error = %format!("{e:#}"), "Cancel failed");
                StepOutcome::failed(step, None, DispatchError::adapter(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{
        CancelResult, MockTradingVenue, OpenOrder, OrderResult, OrderStatus, OrderTypeSpec, TpSl,
        Venue,
    };
    use mockall::predicate::*;
    use mockall::Sequence;
    use rust_decimal_macros::dec;

    const ACCOUNT: &str = "0x1111111111111111111111111111111111111111";

    fn config() -> Config {
        let mut config = Config::default();
        config.credentials.sub_account_address = ACCOUNT.to_string();
        config
    }

    fn resting(oid: u64) -> OrderResult {
        OrderResult {
            status: OrderStatus::Resting { oid },
        }
    }

    fn dispatcher(mock: MockTradingVenue, config: &Config) -> SignalDispatcher {
        SignalDispatcher::new(Arc::new(mock), config)
    }

    #[tokio::test]
    async fn test_entry_submits_in_order_even_when_stop_loss_fails() {
        let mut mock = MockTradingVenue::new();
        let mut seq = Sequence::new();
        mock.expect_venue().return_const(Venue::Paper);

        mock.expect_place_market_order()
            .with(eq("HYPE"), eq(true), eq(dec!(2)), eq(dec!(10.123)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| {
                Ok(OrderResult {
                    status: OrderStatus::Filled {
                        oid: 1,
                        total_size: dec!(2),
                        average_price: dec!(10.13),
                    },
                })
            });
        mock.expect_place_order()
            .with(
                eq("HYPE"),
                eq(false),
                eq(dec!(2)),
                eq(dec!(8.55)),
                eq(OrderTypeSpec::Trigger {
                    trigger_price: dec!(9.5),
                    is_market: true,
                    tpsl: TpSl::Sl,
                }),
                eq(true),
            )
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _, _, _| Err(anyhow::anyhow!("Order rejected: trigger too close")));
        mock.expect_place_order()
            .with(
                eq("HYPE"),
                eq(false),
                eq(dec!(2)),
                eq(dec!(11)),
                eq(OrderTypeSpec::Limit {
                    tif: crate::exchange::TimeInForce::Alo,
                }),
                eq(true),
            )
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _, _, _| Ok(resting(3)));

        let report = dispatcher(mock, &config())
            .dispatch(br#"{"action":"buy","price":"10.12345","size":"2","sl":"9.5","tp":"11"}"#)
            .await
            .unwrap();

        assert_eq!(report.steps.len(), 3);
        assert_eq!(report.steps[0].step, Step::Entry);
        assert!(report.steps[0].is_ok());
        assert_eq!(report.steps[1].step, Step::StopLoss);
        assert_eq!(report.steps[1].status, StepStatus::Error);
        assert!(report.steps[1]
            .error
            .as_deref()
            .unwrap()
            .contains("trigger too close"));
        assert_eq!(report.steps[2].step, Step::TakeProfit);
        assert!(report.steps[2].is_ok());
        assert_eq!(report.failed_steps(), 1);
        assert_eq!(
            report.states,
            vec![
                DispatchState::Received,
                DispatchState::Classified,
                DispatchState::Building,
                DispatchState::Submitting,
                DispatchState::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_close_cancels_before_closing_with_position_size() {
        let mut mock = MockTradingVenue::new();
        let mut seq = Sequence::new();

        mock.expect_list_open_orders()
            .with(eq(ACCOUNT))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(vec![
                    OpenOrder::new(11, "HYPE"),
                    OpenOrder::new(12, "ETH"),
                    OpenOrder::new(13, "HYPE"),
                ])
            });
        mock.expect_get_position_state()
            .with(eq(ACCOUNT))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![PositionSnapshot::new("HYPE", dec!(-7.3))]));
        mock.expect_cancel_order()
            .with(eq("HYPE"), eq(11))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(anyhow::anyhow!("Order was never placed, already canceled, or filled")));
        mock.expect_cancel_order()
            .with(eq("HYPE"), eq(13))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, oid| Ok(CancelResult { order_id: oid }));
        mock.expect_place_order()
            .with(
                eq("HYPE"),
                eq(true),
                eq(dec!(7.3)),
                eq(dec!(22)),
                eq(OrderTypeSpec::Limit {
                    tif: crate::exchange::TimeInForce::Ioc,
                }),
                eq(true),
            )
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _, _, _| Ok(resting(99)));

        let report = dispatcher(mock, &config())
            .dispatch(br#"{"action":"close_short","price":"20","size":"100"}"#)
            .await
            .unwrap();

        let steps: Vec<Step> = report.steps.iter().map(|s| s.step.clone()).collect();
        assert_eq!(
            steps,
            vec![
                Step::Cancel { order_id: 11 },
                Step::Cancel { order_id: 13 },
                Step::Close
            ]
        );
        assert!(!report.steps[0].is_ok());
        assert_eq!(report.steps[2].intent.as_ref().unwrap().size, dec!(7.3));
        assert_eq!(report.position, Some(PositionSnapshot::new("HYPE", dec!(-7.3))));
    }

    #[tokio::test]
    async fn test_close_long_on_flat_position_only_sweeps() {
        let mut mock = MockTradingVenue::new();
        mock.expect_list_open_orders()
            .returning(|_| Ok(vec![OpenOrder::new(5, "HYPE")]));
        mock.expect_get_position_state().returning(|_| Ok(vec![]));
        mock.expect_cancel_order()
            .times(1)
            .returning(|_, oid| Ok(CancelResult { order_id: oid }));
        mock.expect_place_order().never();
        mock.expect_place_market_order().never();

        let report = dispatcher(mock, &config())
            .dispatch(br#"{"action":"close_long","price":"20"}"#)
            .await
            .unwrap();

        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].step, Step::Cancel { order_id: 5 });
        assert_eq!(report.message(), "Parachute executed");
    }

    #[tokio::test]
    async fn test_malformed_signal_makes_no_venue_calls() {
        let mut mock = MockTradingVenue::new();
        mock.expect_place_market_order().never();
        mock.expect_place_order().never();
        mock.expect_cancel_order().never();
        mock.expect_list_open_orders().never();
        mock.expect_get_position_state().never();

        let d = dispatcher(mock, &config());
        let err = d.dispatch(br#"{"price":"10","sl":"9","tp":"11"}"#).await.unwrap_err();
        assert!(matches!(err, DispatchError::MalformedSignal(_)));

        let err = d.dispatch(br#"{"action":"flip","price":"10"}"#).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownAction(_)));

        let err = d.dispatch(br#"{"action":"close_long","price":"-3"}"#).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidPrice { .. }));

        let err = d
            .dispatch(br#"{"action":"sell","price":"10","size":"0","sl":"11","tp":"9"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidSize(_)));
    }

    #[tokio::test]
    async fn test_snapshot_failure_aborts_before_any_submission() {
        let mut mock = MockTradingVenue::new();
        mock.expect_list_open_orders()
            .returning(|_| Err(anyhow::anyhow!("Hyperliquid API error 502")));
        mock.expect_get_position_state().never();
        mock.expect_cancel_order().never();
        mock.expect_place_order().never();

        let err = dispatcher(mock, &config())
            .dispatch(br#"{"action":"close_long","price":"20"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Adapter(msg) if msg.contains("502")));
    }

    #[tokio::test]
    async fn test_refetch_uses_fresh_position_size() {
        let mut cfg = config();
        cfg.execution.refetch_position_before_close = true;

        let mut mock = MockTradingVenue::new();
        let mut seq = Sequence::new();
        mock.expect_list_open_orders()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![OpenOrder::new(1, "HYPE")]));
        mock.expect_get_position_state()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![PositionSnapshot::new("HYPE", dec!(10))]));
        mock.expect_cancel_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, oid| Ok(CancelResult { order_id: oid }));
        mock.expect_get_position_state()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![PositionSnapshot::new("HYPE", dec!(4))]));
        mock.expect_place_order()
            .with(always(), eq(false), eq(dec!(4)), eq(dec!(18)), always(), eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _, _, _| Ok(resting(7)));

        let report = dispatcher(mock, &cfg)
            .dispatch(br#"{"action":"close_long","price":"20"}"#)
            .await
            .unwrap();
        assert_eq!(report.steps.len(), 2);
        assert!(report.steps.iter().all(|s| s.is_ok()));
    }

    #[tokio::test]
    async fn test_refetch_failure_is_reported_as_failed_close() {
        let mut cfg = config();
        cfg.execution.refetch_position_before_close = true;

        let mut mock = MockTradingVenue::new();
        let mut seq = Sequence::new();
        mock.expect_list_open_orders()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![OpenOrder::new(1, "HYPE")]));
        mock.expect_get_position_state()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![PositionSnapshot::new("HYPE", dec!(10))]));
        mock.expect_cancel_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, oid| Ok(CancelResult { order_id: oid }));
        mock.expect_get_position_state()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow::anyhow!("info endpoint unavailable")));
        mock.expect_place_order().never();
        mock.expect_place_market_order().never();

        let report = dispatcher(mock, &cfg)
            .dispatch(br#"{"action":"close_long","price":"20"}"#)
            .await
            .unwrap();
        assert_eq!(report.steps.len(), 2);
        assert!(report.steps[0].is_ok());
        let close = &report.steps[1];
        assert_eq!(close.step, Step::Close);
        assert_eq!(close.status, StepStatus::Error);
        assert!(close
            .error
            .as_deref()
            .unwrap()
            .contains("info endpoint unavailable"));
        assert_eq!(report.final_state(), DispatchState::Completed);
    }

    #[test]
    fn test_report_serializes_steps_flat() {
        let report = DispatchReport {
            action: Action::CloseLong,
            symbol: "HYPE".to_string(),
            position: None,
            steps: vec![StepOutcome::ok(
                Step::Cancel { order_id: 9 },
                None,
                Some(serde_json::json!({"order_id": 9})),
            )],
            states: vec![DispatchState::Received, DispatchState::Completed],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["steps"][0]["step"], "cancel");
        assert_eq!(json["steps"][0]["order_id"], 9);
        assert_eq!(json["steps"][0]["status"], "ok");
        assert_eq!(report.final_state(), DispatchState::Completed);
    }
}
