//! Price normalization to venue precision.

use crate::config::{ExecutionConfig, PrecisionMode};
use crate::error::DispatchError;
use crate::utils::decimal::{apply_offset, round_to_precision, round_to_significant_figures};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Precision policy applied to every price of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionPolicy {
    SignificantFigures(u32),
    DecimalPlaces(u32),
}

impl PrecisionPolicy {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        match config.precision {
            PrecisionMode::SignificantFigures => {
                PrecisionPolicy::SignificantFigures(config.significant_figures)
            }
            PrecisionMode::DecimalPlaces => PrecisionPolicy::DecimalPlaces(config.decimal_places),
        }
    }

    /// Smallest step between adjacent legal prices around `price`.
    ///
    /// `None` when the step is not representable.
    pub fn tick(&self, price: Decimal) -> Option<Decimal> {
        match *self {
            PrecisionPolicy::DecimalPlaces(places) => Decimal::try_new(1, places).ok(),
            PrecisionPolicy::SignificantFigures(figures) => {
                let mantissa = price.mantissa().unsigned_abs();
                if mantissa == 0 {
                    return None;
                }
                // price = mantissa * 10^-scale, so its leading digit sits at 10^(digits - scale - 1)
                let digits = i64::from(mantissa.ilog10()) + 1;
                let exponent = digits - i64::from(price.scale()) - i64::from(figures);
                if exponent >= 0 {
                    let step = 10i128.checked_pow(u32::try_from(exponent).ok()?)?;
                    Decimal::try_from_i128_with_scale(step, 0).ok()
                } else {
                    Decimal::try_new(1, u32::try_from(-exponent).ok()?).ok()
                }
            }
        }
    }
}

/// A strictly positive price that is a fixed point of the active policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NormalizedPrice(Decimal);

impl NormalizedPrice {
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for NormalizedPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<NormalizedPrice> for Decimal {
    fn from(price: NormalizedPrice) -> Self {
        price.0
    }
}

/// Converts raw decimals into venue-legal prices.
#[derive(Debug, Clone, Copy)]
pub struct PriceNormalizer {
    policy: PrecisionPolicy,
}

impl PriceNormalizer {
    pub fn new(policy: PrecisionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PrecisionPolicy {
        self.policy
    }

    /// Normalize a raw price. `field` names the input in errors.
    pub fn normalize_field(
        &self,
        raw: Decimal,
        field: &'static str,
    ) -> Result<NormalizedPrice, DispatchError> {
        if raw <= Decimal::ZERO {
            return Err(DispatchError::InvalidPrice {
                field,
                reason: format!("must be positive, got {raw}"),
            });
        }

        let rounded = match self.policy {
            PrecisionPolicy::SignificantFigures(figures) => {
                round_to_significant_figures(raw, figures).ok_or_else(|| {
                    DispatchError::InvalidPrice {
                        field,
                        reason: format!("{raw} cannot be rounded to {figures} significant figures"),
                    }
                })?
            }
            PrecisionPolicy::DecimalPlaces(places) => round_to_precision(raw, places),
        };

        if rounded <= Decimal::ZERO {
            return Err(DispatchError::InvalidPrice {
                field,
                reason: format!("{raw} rounds to zero"),
            });
        }

        Ok(NormalizedPrice(rounded))
    }

    pub fn normalize(&self, raw: Decimal) -> Result<NormalizedPrice, DispatchError> {
        self.normalize_field(raw, "price")
    }

    /// Move a normalized price by `offset` (e.g. -0.1 for 10% lower) and renormalize.
    ///
    /// A non-zero offset always yields a price strictly beyond `price` in the
    /// offset's direction. When rounding pulls the result back onto `price`,
    /// it is stepped one tick further.
    pub fn bump(
        &self,
        price: NormalizedPrice,
        offset: Decimal,
        field: &'static str,
    ) -> Result<NormalizedPrice, DispatchError> {
        let overflow = || DispatchError::InvalidPrice {
            field,
            reason: format!("{price} offset by {offset} overflows"),
        };

        let raw = apply_offset(price.0, offset).ok_or_else(overflow)?;
        let bumped = self.normalize_field(raw, field)?;
        if offset.is_zero() || is_beyond(bumped, price, offset) {
            return Ok(bumped);
        }

        let tick = self.policy.tick(price.0).ok_or_else(overflow)?;
        let stepped = if offset.is_sign_positive() {
            price.0.checked_add(tick)
        } else {
            price.0.checked_sub(tick)
        };
        let stepped = stepped.ok_or_else(overflow)?;
        let stepped = self.normalize_field(stepped, field)?;
        if !is_beyond(stepped, price, offset) {
            return Err(DispatchError::InvalidPrice {
                field,
                reason: format!("no legal price beyond {price} in the direction of {offset}"),
            });
        }
        Ok(stepped)
    }
}

fn is_beyond(candidate: NormalizedPrice, price: NormalizedPrice, offset: Decimal) -> bool {
    if offset.is_sign_positive() {
        candidate > price
    } else {
        candidate < price
    }
}
