/*
[INPUT]:  API schema definitions and serde requirements
[OUTPUT]: Typed Rust structs with serialization support
[POS]:    Data layer - REST record types returned by the exchange
[UPDATE]: When API schema changes or new types added
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order status record returned by place, cancel, replace and active orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub price: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub avg_execution_price: Decimal,
    #[serde(default)]
    pub side: String,
    #[serde(rename = "type", default)]
    pub order_type: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub is_cancelled: bool,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub original_amount: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub remaining_amount: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub executed_amount: Decimal,
}

/// Active margin position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub id: i64,
    pub symbol: String,
    #[serde(default)]
    pub status: String,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub base: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub amount: Decimal,
    #[serde(default)]
    pub timestamp: String,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub swap: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub pl: Decimal,
}

/// One wallet/currency balance line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    #[serde(rename = "type")]
    pub wallet: String,
    pub currency: String,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub amount: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub available: Decimal,
}

/// Public ticker snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerRecord {
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub mid: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub bid: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub ask: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub last_price: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub low: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub high: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub volume: Decimal,
    #[serde(default)]
    pub timestamp: String,
}

impl TickerRecord {
    /// Best available price: mid, then last trade.
    pub fn price(&self) -> Option<Decimal> {
        if self.mid > Decimal::ZERO {
            Some(self.mid)
        } else if self.last_price > Decimal::ZERO {
            Some(self.last_price)
        } else {
            None
        }
    }
}

/// Error body returned on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default, alias = "error")]
    pub message: String,
}

pub(crate) mod serde_helpers {
    use super::Decimal;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    use crate::mapping::numeric;

    /// Null, empty and unparseable values become zero.
    pub fn deserialize_decimal_or_zero<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(numeric::decimal_from_value(&value).unwrap_or(Decimal::ZERO))
    }

    pub fn serialize_decimal<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&numeric::format_decimal(*value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn order_record_deserializes_exchange_payload() {
        let value = json!({
            "id": 448364249,
            "symbol": "btcusd",
            "exchange": "bitfinex",
            "price": "0.01",
            "avg_execution_price": "0.0",
            "side": "buy",
            "type": "exchange limit",
            "timestamp": "1444272165.252370982",
            "is_live": true,
            "is_cancelled": false,
            "is_hidden": false,
            "was_forced": false,
            "original_amount": "0.01",
            "remaining_amount": "0.01",
            "executed_amount": "0.0",
            "order_id": 448364249
        });

        let order: OrderRecord = serde_json::from_value(value).expect("order should deserialize");

        assert_eq!(order.id, 448364249);
        assert_eq!(order.order_type, "exchange limit");
        assert_eq!(order.remaining_amount, Decimal::from_str("0.01").unwrap());
        assert!(order.is_live);
    }

    #[test]
    fn order_record_tolerates_missing_id_and_garbage_amounts() {
        let value = json!({
            "symbol": "btcusd",
            "price": "n/a",
            "original_amount": null,
            "side": "sell",
            "type": "limit"
        });

        let order: OrderRecord = serde_json::from_value(value).expect("order should deserialize");

        assert_eq!(order.id, 0);
        assert_eq!(order.price, Decimal::ZERO);
        assert_eq!(order.original_amount, Decimal::ZERO);
    }

    #[test]
    fn ticker_price_prefers_mid() {
        let ticker: TickerRecord = serde_json::from_value(json!({
            "mid": "244.755",
            "bid": "244.75",
            "ask": "244.76",
            "last_price": "244.82",
            "timestamp": "1444253422.348340958"
        }))
        .unwrap();
        assert_eq!(ticker.price(), Some(Decimal::from_str("244.755").unwrap()));

        let no_mid: TickerRecord = serde_json::from_value(json!({
            "last_price": "244.82"
        }))
        .unwrap();
        assert_eq!(no_mid.price(), Some(Decimal::from_str("244.82").unwrap()));
    }

    #[test]
    fn error_response_accepts_error_alias() {
        let err: ErrorResponse = serde_json::from_value(json!({"error": "ERR_RATE_LIMIT"})).unwrap();
        assert_eq!(err.message, "ERR_RATE_LIMIT");
    }
}
