//! Hyperliquid exchange integration.
//!
//! Orders and cancels go to `/exchange` as L1 actions signed by an approved
//! agent wallet; open orders, positions and the asset universe come from
//! `/info`.
//!
//! # Precision Notes
//!
//! Perp prices accept at most 5 significant figures and `6 - szDecimals`
//! decimals. Assets are addressed by their index in the `meta` universe, so
//! the universe is loaded once at startup.

mod client;
mod signing;
mod types;

pub use client::HyperliquidClient;
pub use signing::{action_hash, AgentSigner};
pub use types::*;
