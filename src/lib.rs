//! # Hyperliquid Webhook Trader
//!
//! Turns chart alert webhooks into bracketed orders on Hyperliquid perpetuals.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `signal`: Webhook payload decoding and action classification
//! - `strategy`: Price normalization, bracket building, position reconciliation
//!   and the dispatch state machine
//! - `exchange`: Trading venue seam, Hyperliquid client and paper venue
//! - `server`: HTTP endpoints
//! - `error`: Dispatch failure taxonomy
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod error;
pub mod exchange;
pub mod server;
pub mod signal;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::DispatchError;
