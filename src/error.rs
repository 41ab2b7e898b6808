//! Failure taxonomy for a single signal dispatch.

use thiserror::Error;

/// Why a dispatch ended in the `Failed` state, or why one of its steps failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Body is not JSON, or a required field is missing or of the wrong shape.
    #[error("malformed signal: {0}")]
    MalformedSignal(String),

    /// `action` is present but not one of buy, sell, close_long, close_short.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// A price is non-numeric, zero, negative or not representable.
    #[error("invalid price for {field}: {reason}")]
    InvalidPrice { field: &'static str, reason: String },

    /// An order size is non-numeric or not strictly positive.
    #[error("invalid size: {0}")]
    InvalidSize(String),

    /// The trading interface call itself failed (transport, rejection, validation).
    #[error("adapter error: {0}")]
    Adapter(String),
}

impl DispatchError {
    /// Wrap an adapter failure keeping its whole context chain.
    pub fn adapter(err: &anyhow::Error) -> Self {
        Self::Adapter(format!("{err:#}"))
    }

    /// Stable machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedSignal(_) => "malformed_signal",
            Self::UnknownAction(_) => "unknown_action",
            Self::InvalidPrice { .. } => "invalid_price",
            Self::InvalidSize(_) => "invalid_size",
            Self::Adapter(_) => "adapter_error",
        }
    }
}
