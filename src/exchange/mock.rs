//! Paper venue for dry runs.
//!
//! Simulates fills, resting orders and positions in memory so the server can
//! run end to end without credentials. Every call is recorded, and failures
//! can be injected per operation.

use super::traits::{TradingVenue, Venue};
use super::types::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Calls kept in the log by default; older calls are dropped first.
pub const MAX_RECORDED_CALLS: usize = 1024;

/// Venue operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaperOperation {
    MarketOrder,
    PlaceOrder,
    Cancel,
    OpenOrders,
    Positions,
}

/// A call received by the paper venue, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaperCall {
    MarketOrder {
        symbol: String,
        is_buy: bool,
        size: Decimal,
        reference_price: Decimal,
    },
    PlaceOrder {
        symbol: String,
        is_buy: bool,
        size: Decimal,
        limit_price: Decimal,
        order_type: OrderTypeSpec,
        reduce_only: bool,
    },
    Cancel {
        symbol: String,
        order_id: u64,
    },
    OpenOrders {
        account: String,
    },
    Positions {
        account: String,
    },
}

impl PaperCall {
    pub fn operation(&self) -> PaperOperation {
        match self {
            PaperCall::MarketOrder { .. } => PaperOperation::MarketOrder,
            PaperCall::PlaceOrder { .. } => PaperOperation::PlaceOrder,
            PaperCall::Cancel { .. } => PaperOperation::Cancel,
            PaperCall::OpenOrders { .. } => PaperOperation::OpenOrders,
            PaperCall::Positions { .. } => PaperOperation::Positions,
        }
    }
}

/// Simulated account state.
#[derive(Debug, Default, Clone)]
pub struct PaperState {
    /// Signed size per symbol; zero entries are dropped
    pub positions: HashMap<String, Decimal>,
    /// Resting orders by id
    pub open_orders: BTreeMap<u64, OpenOrder>,
    /// Most recent calls, oldest first
    pub calls: VecDeque<PaperCall>,
    pub fill_count: u64,
}

impl PaperState {
    fn apply_fill(&mut self, symbol: &str, is_buy: bool, size: Decimal) -> Result<()> {
        let signed = if is_buy { size } else { -size };
        let szi = self
            .positions
            .get(symbol)
            .copied()
            .unwrap_or_default()
            .checked_add(signed)
            .with_context(|| format!("Position size overflow on {symbol}"))?;
        if szi.is_zero() {
            self.positions.remove(symbol);
        } else {
            self.positions.insert(symbol.to_string(), szi);
        }
        self.fill_count += 1;
        Ok(())
    }
}

/// In-memory [`TradingVenue`].
#[derive(Debug)]
pub struct PaperVenue {
    state: Arc<RwLock<PaperState>>,
    order_id_counter: AtomicU64,
    call_capacity: usize,
    failures: Arc<RwLock<HashMap<PaperOperation, String>>>,
}

impl Default for PaperVenue {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperVenue {
    pub fn new() -> Self {
        Self::with_call_capacity(MAX_RECORDED_CALLS)
    }

    /// Paper venue that keeps at most `call_capacity` calls in its log.
    pub fn with_call_capacity(call_capacity: usize) -> Self {
        info!(call_capacity, "Paper venue initialized");

        Self {
            state: Arc::new(RwLock::new(PaperState::default())),
            order_id_counter: AtomicU64::new(1),
            call_capacity,
            failures: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Overwrite the position for `symbol`.
    pub async fn set_position(&self, symbol: &str, szi: Decimal) {
        let mut state = self.state.write().await;
        if szi.is_zero() {
            state.positions.remove(symbol);
        } else {
            state.positions.insert(symbol.to_string(), szi);
        }
    }

    /// Make the next call of `operation` fail with `message`.
    pub async fn fail_next(&self, operation: PaperOperation, message: impl Into<String>) {
        self.failures.write().await.insert(operation, message.into());
    }

    /// Get a snapshot of the current state.
    pub async fn get_state(&self) -> PaperState {
        self.state.read().await.clone()
    }

    pub async fn calls(&self) -> Vec<PaperCall> {
        self.state.read().await.calls.iter().cloned().collect()
    }

    fn next_order_id(&self) -> u64 {
        self.order_id_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Record the call, then consume an injected failure for its operation if any.
    async fn record(&self, call: PaperCall) -> Result<()> {
        let operation = call.operation();
        {
            let mut state = self.state.write().await;
            state.calls.push_back(call);
            while state.calls.len() > self.call_capacity {
                state.calls.pop_front();
            }
        }

        if let Some(message) = self.failures.write().await.remove(&operation) {
            debug!(?operation, %message, "Injected paper failure");
            anyhow::bail!(message);
        }
        Ok(())
    }
}

#[async_trait]
impl TradingVenue for PaperVenue {
    fn venue(&self) -> Venue {
        Venue::Paper
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        reference_price: Decimal,
    ) -> Result<OrderResult> {
        self.record(PaperCall::MarketOrder {
            symbol: symbol.to_string(),
            is_buy,
            size,
            reference_price,
        })
        .await?;

        let oid = self.next_order_id();
        self.state.write().await.apply_fill(symbol, is_buy, size)?;

        info!(
            oid,
            symbol,
            side = %Side::from_is_buy(is_buy),
            size = %size,
            price = %reference_price,
            "Paper market order filled"
        );

        Ok(OrderResult {
            status: OrderStatus::Filled {
                oid,
                total_size: size,
                average_price: reference_price,
            },
        })
    }

    async fn place_order(
        &self,
        symbol: &str,
        is_buy: bool,
        size: Decimal,
        limit_price: Decimal,
        order_type: OrderTypeSpec,
        reduce_only: bool,
    ) -> Result<OrderResult> {
        self.record(PaperCall::PlaceOrder {
            symbol: symbol.to_string(),
            is_buy,
            size,
            limit_price,
            order_type,
            reduce_only,
        })
        .await?;

        let mut state = self.state.write().await;
        let oid = self.next_order_id();

        if order_type == (OrderTypeSpec::Limit { tif: TimeInForce::Ioc }) {
            let mut fill_size = size;
            if reduce_only {
                let szi = state.positions.get(symbol).copied().unwrap_or_default();
                let reduces = (is_buy && szi < Decimal::ZERO) || (!is_buy && szi > Decimal::ZERO);
                if !reduces {
                    anyhow::bail!("Reduce only order would increase position.");
                }
                fill_size = size.min(szi.abs());
            }
            state.apply_fill(symbol, is_buy, fill_size)?;

            info!(oid, symbol, size = %fill_size, price = %limit_price, "Paper IOC order filled");
            return Ok(OrderResult {
                status: OrderStatus::Filled {
                    oid,
                    total_size: fill_size,
                    average_price: limit_price,
                },
            });
        }

        state.open_orders.insert(
            oid,
            OpenOrder {
                order_id: oid,
                symbol: symbol.to_string(),
                side: Some(Side::from_is_buy(is_buy)),
                limit_price: Some(limit_price),
                size: Some(size),
            },
        );

        info!(oid, symbol, ?order_type, price = %limit_price, "Paper order resting");
        Ok(OrderResult {
            status: OrderStatus::Resting { oid },
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<CancelResult> {
        self.record(PaperCall::Cancel {
            symbol: symbol.to_string(),
            order_id,
        })
        .await?;

        let mut state = self.state.write().await;
        match state.open_orders.get(&order_id) {
            Some(order) if order.symbol == symbol => {
                state.open_orders.remove(&order_id);
                debug!(order_id, symbol, "Paper order canceled");
                Ok(CancelResult { order_id })
            }
            _ => anyhow::bail!("Order was never placed, already canceled, or filled."),
        }
    }

    async fn list_open_orders(&self, account: &str) -> Result<Vec<OpenOrder>> {
        self.record(PaperCall::OpenOrders {
            account: account.to_string(),
        })
        .await?;

        Ok(self.state.read().await.open_orders.values().cloned().collect())
    }

    async fn get_position_state(&self, account: &str) -> Result<Vec<PositionSnapshot>> {
        self.record(PaperCall::Positions {
            account: account.to_string(),
        })
        .await?;

        let state = self.state.read().await;
        let mut positions: Vec<PositionSnapshot> = state
            .positions
            .iter()
            .map(|(symbol, szi)| PositionSnapshot::new(symbol.clone(), *szi))
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }
}
