/*
[INPUT]:  Exchange decimal strings/JSON numbers and the configured scale factor
[OUTPUT]: Parsed decimals, plain-notation decimal strings, scaled quantities/prices
[POS]:    Mapping layer - numeric normalization between exchange and engine units
[UPDATE]: When wire number formats or unit conventions change
*/

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::http::{BitfinexError, Result};

/// Parse a decimal string, accepting plain and scientific notation.
///
/// Blank or malformed input yields `None` so callers can drop the field
/// instead of the whole message.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Decimal from a JSON string or number; anything else is absent.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(raw) => parse_decimal(raw),
        Value::Number(number) => parse_decimal(&number.to_string()),
        _ => None,
    }
}

/// Integer from a JSON string or number.
pub fn i64_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

/// Plain-notation string without trailing zeros (never `1E-07`).
pub fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Legacy multiplier between engine lot units and exchange units.
///
/// Outbound quantities are multiplied and outbound prices divided; inbound
/// quantities are divided and inbound prices multiplied. A factor of one is a
/// pass-through. Conversions are checked: `None` means the result does not
/// fit a `Decimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleFactor(Decimal);

impl ScaleFactor {
    pub const IDENTITY: ScaleFactor = ScaleFactor(Decimal::ONE);

    pub fn new(factor: Decimal) -> Result<Self> {
        if factor <= Decimal::ZERO {
            return Err(BitfinexError::Config(format!(
                "scale factor must be positive, got {factor}"
            )));
        }
        Ok(Self(factor))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_identity(&self) -> bool {
        self.0 == Decimal::ONE
    }

    pub fn to_exchange_quantity(&self, quantity: Decimal) -> Option<Decimal> {
        if self.is_identity() {
            return Some(quantity);
        }
        quantity.checked_mul(self.0)
    }

    pub fn to_exchange_price(&self, price: Decimal) -> Option<Decimal> {
        if self.is_identity() {
            return Some(price);
        }
        price.checked_div(self.0)
    }

    pub fn from_exchange_quantity(&self, quantity: Decimal) -> Option<Decimal> {
        if self.is_identity() {
            return Some(quantity);
        }
        quantity.checked_div(self.0)
    }

    pub fn from_exchange_price(&self, price: Decimal) -> Option<Decimal> {
        if self.is_identity() {
            return Some(price);
        }
        price.checked_mul(self.0)
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::IDENTITY
    }
}
