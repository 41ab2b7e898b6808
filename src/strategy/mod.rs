//! Signal handling strategy.
//!
//! Contains the core logic for:
//! - Price normalization to venue precision
//! - Bracket construction for entries (market entry, stop loss, take profit)
//! - Position reconciliation for closes (the "parachute")
//! - Dispatching a signal through the venue in order

mod bracket;
mod dispatcher;
mod normalizer;
mod parachute;

pub use bracket::{BracketBuilder, BracketOrders};
pub use dispatcher::{
    DispatchReport, DispatchState, SignalDispatcher, Step, StepOutcome, StepStatus,
};
pub use normalizer::{NormalizedPrice, PrecisionPolicy, PriceNormalizer};
pub use parachute::{ParachutePlan, PositionReconciler};
