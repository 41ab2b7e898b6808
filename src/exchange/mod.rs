//! Venue integrations behind the [`TradingVenue`] seam.
//!
//! ## Hyperliquid
//! Signed order placement and cancellation, plus open-order and position
//! queries for the configured sub-account.
//!
//! ## Paper
//! In-memory simulation used when live trading is disabled.

pub mod hyperliquid;
pub mod mock;
mod traits;
mod types;

pub use hyperliquid::HyperliquidClient;
pub use mock::PaperVenue;
#[cfg(test)]
pub use traits::MockTradingVenue;
pub use traits::{TradingVenue, Venue};
pub use types::*;
