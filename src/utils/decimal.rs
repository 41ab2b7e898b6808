//! Decimal arithmetic utilities for price and size precision.

use rust_decimal::{Decimal, RoundingStrategy};

/// Maximum number of decimals the venue accepts on the wire.
pub const WIRE_DECIMALS: u32 = 8;

/// Round a decimal to a specific number of decimal places (half-to-even).
pub fn round_to_precision(value: Decimal, decimals: u32) -> Decimal {
    value
        .round_dp_with_strategy(decimals, RoundingStrategy::MidpointNearestEven)
        .normalize()
}

/// Round a decimal to a number of significant figures (half-to-even).
///
/// Returns `None` when the value cannot be represented after rounding.
pub fn round_to_significant_figures(value: Decimal, figures: u32) -> Option<Decimal> {
    if value.is_zero() {
        return Some(Decimal::ZERO);
    }
    value
        .round_sf_with_strategy(figures, RoundingStrategy::MidpointNearestEven)
        .map(|v| v.normalize())
}

/// Apply a fractional offset to a price: `price * (1 + offset)`.
///
/// Returns `None` on overflow.
pub fn apply_offset(price: Decimal, offset: Decimal) -> Option<Decimal> {
    Decimal::ONE
        .checked_add(offset)
        .and_then(|factor| price.checked_mul(factor))
}

/// Render a decimal the way the venue expects it on the wire:
/// at most eight decimals, no trailing zeros, no negative zero.
pub fn to_wire_string(value: Decimal) -> String {
    let rounded = value.round_dp(WIRE_DECIMALS).normalize();
    if rounded.is_zero() {
        "0".to_string()
    } else {
        rounded.to_string()
    }
}
