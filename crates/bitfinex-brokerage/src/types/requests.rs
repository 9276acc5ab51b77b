/*
[INPUT]:  API schema definitions and serde requirements
[OUTPUT]: Typed Rust request structs with serialization support
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When API schema changes or new types added
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::Side;
use super::models::serde_helpers;

pub const EXCHANGE_NAME: &str = "bitfinex";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderRequest {
    /// Lower-case exchange pair
    pub symbol: String,
    /// Absolute amount in exchange units
    #[serde(serialize_with = "serde_helpers::serialize_decimal")]
    pub amount: Decimal,
    #[serde(serialize_with = "serde_helpers::serialize_decimal")]
    pub price: Decimal,
    pub exchange: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOrderRequest {
    pub order_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceOrderRequest {
    pub order_id: i64,
    pub symbol: String,
    #[serde(serialize_with = "serde_helpers::serialize_decimal")]
    pub amount: Decimal,
    #[serde(serialize_with = "serde_helpers::serialize_decimal")]
    pub price: Decimal,
    pub exchange: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn new_order_request_serializes_wire_names() {
        let req = NewOrderRequest {
            symbol: "btcusd".to_string(),
            amount: Decimal::from_str("0.0000001").unwrap(),
            price: Decimal::from_str("250.00").unwrap(),
            exchange: EXCHANGE_NAME.to_string(),
            side: Side::Sell,
            order_type: "exchange limit".to_string(),
        };

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["type"], "exchange limit");
        assert_eq!(value["side"], "sell");
        assert_eq!(value["amount"], "0.0000001");
        assert_eq!(value["price"], "250");
        assert_eq!(value["exchange"], "bitfinex");
    }
}
