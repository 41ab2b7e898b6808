//! Inbound webhook signals.
//!
//! Decoding happens in two steps so the dispatcher can tell a malformed body
//! from a well-formed body carrying an action it does not know:
//! [`SignalPayload`] is the loose JSON shape, [`Signal`] the validated value.

use crate::error::DispatchError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Signal action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
    CloseLong,
    CloseShort,
}

/// Which pipeline an action is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
    Entry { is_buy: bool },
    Close,
}

impl Action {
    pub fn class(&self) -> ActionClass {
        match self {
            Action::Buy => ActionClass::Entry { is_buy: true },
            Action::Sell => ActionClass::Entry { is_buy: false },
            Action::CloseLong | Action::CloseShort => ActionClass::Close,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::CloseLong => "close_long",
            Action::CloseShort => "close_short",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Action::Buy),
            "sell" => Ok(Action::Sell),
            "close_long" => Ok(Action::CloseLong),
            "close_short" => Ok(Action::CloseShort),
            _ => Err(DispatchError::UnknownAction(s.to_string())),
        }
    }
}

/// Raw webhook body. Decimal fields may arrive as JSON numbers or strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
    #[serde(default)]
    pub action: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub size: Option<Value>,
    #[serde(default, alias = "sl")]
    pub stop_loss: Option<Value>,
    #[serde(default, alias = "tp")]
    pub take_profit: Option<Value>,
}

/// Validated, immutable signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub action: Action,
    /// Chart/reference price
    pub price: Decimal,
    /// Explicit size in base units, if the alert carried one
    pub size: Option<Decimal>,
    /// Present for entry actions
    pub stop_loss: Option<Decimal>,
    /// Present for entry actions
    pub take_profit: Option<Decimal>,
}

impl Signal {
    /// Decode a request body.
    pub fn from_json(body: &[u8]) -> Result<Self, DispatchError> {
        let payload: SignalPayload = serde_json::from_slice(body)
            .map_err(|e| DispatchError::MalformedSignal(format!("invalid JSON body: {e}")))?;
        Self::try_from(payload)
    }

    /// Stop-loss of an entry signal.
    pub fn stop_loss(&self) -> Result<Decimal, DispatchError> {
        self.stop_loss
            .ok_or_else(|| DispatchError::MalformedSignal("missing field `stopLoss`".to_string()))
    }

    /// Take-profit of an entry signal.
    pub fn take_profit(&self) -> Result<Decimal, DispatchError> {
        self.take_profit
            .ok_or_else(|| DispatchError::MalformedSignal("missing field `takeProfit`".to_string()))
    }
}

impl TryFrom<SignalPayload> for Signal {
    type Error = DispatchError;

    fn try_from(payload: SignalPayload) -> Result<Self, Self::Error> {
        let action = match payload.action {
            Some(Value::String(s)) => s.parse::<Action>()?,
            Some(other) => {
                return Err(DispatchError::MalformedSignal(format!(
                    "field `action` must be a string, got {other}"
                )))
            }
            None => {
                return Err(DispatchError::MalformedSignal(
                    "missing field `action`".to_string(),
                ))
            }
        };

        let price = required(payload.price, "price")?;
        let price = parse_price(&price, "price")?;

        let size = match payload.size {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                decimal_from_value(&v)
                    .ok_or_else(|| DispatchError::InvalidSize(format!("not a number: {v}")))?,
            ),
        };

        let (stop_loss, take_profit) = match action.class() {
            ActionClass::Entry { .. } => {
                let sl = required(payload.stop_loss, "stopLoss")?;
                let tp = required(payload.take_profit, "takeProfit")?;
                (
                    Some(parse_price(&sl, "stopLoss")?),
                    Some(parse_price(&tp, "takeProfit")?),
                )
            }
            // Brackets on a close signal are ignored, but must still be numbers if sent.
            ActionClass::Close => (
                optional_price(payload.stop_loss, "stopLoss")?,
                optional_price(payload.take_profit, "takeProfit")?,
            ),
        };

        Ok(Signal {
            action,
            price,
            size,
            stop_loss,
            take_profit,
        })
    }
}

fn required(value: Option<Value>, field: &'static str) -> Result<Value, DispatchError> {
    match value {
        Some(Value::Null) | None => Err(DispatchError::MalformedSignal(format!(
            "missing field `{field}`"
        ))),
        Some(v) => Ok(v),
    }
}

fn optional_price(value: Option<Value>, field: &'static str) -> Result<Option<Decimal>, DispatchError> {
    match value {
        Some(Value::Null) | None => Ok(None),
        Some(v) => parse_price(&v, field).map(Some),
    }
}

fn parse_price(value: &Value, field: &'static str) -> Result<Decimal, DispatchError> {
    decimal_from_value(value).ok_or_else(|| DispatchError::InvalidPrice {
        field,
        reason: format!("not a number: {value}"),
    })
}

/// Accept `"10.5"`, `10.5` and `1e3`.
fn decimal_from_value(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
