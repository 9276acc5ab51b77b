/*
[INPUT]:  API schema definitions and serde requirements
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When API schema changes or new types added
*/

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Account mode; selects the wallet orders trade against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Exchange wallet, spot only
    Cash,
    /// Trading wallet, margin positions
    Margin,
}

impl AccountType {
    /// Wallet name used by balance records and wallet updates.
    pub fn wallet(&self) -> &'static str {
        match self {
            AccountType::Cash => "exchange",
            AccountType::Margin => "trading",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityType {
    Equity,
    Forex,
    Cfd,
    Crypto,
}

/// Engine-side order types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
}

/// Engine-side order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    Invalid,
    UpdateSubmitted,
}

impl OrderStatus {
    /// Returns true for states after which no further fills are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Invalid
        )
    }
}

/// Raw order-type vocabulary of the exchange.
///
/// The exchange wallet family carries an `exchange ` prefix; the trading
/// wallet family is bare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireOrderType {
    Market,
    Limit,
    Stop,
    TrailingStop,
    FillOrKill,
    ExchangeMarket,
    ExchangeLimit,
    ExchangeStop,
    ExchangeTrailingStop,
    ExchangeFillOrKill,
}

impl WireOrderType {
    pub const ALL: [WireOrderType; 10] = [
        WireOrderType::Market,
        WireOrderType::Limit,
        WireOrderType::Stop,
        WireOrderType::TrailingStop,
        WireOrderType::FillOrKill,
        WireOrderType::ExchangeMarket,
        WireOrderType::ExchangeLimit,
        WireOrderType::ExchangeStop,
        WireOrderType::ExchangeTrailingStop,
        WireOrderType::ExchangeFillOrKill,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WireOrderType::Market => "market",
            WireOrderType::Limit => "limit",
            WireOrderType::Stop => "stop",
            WireOrderType::TrailingStop => "trailing-stop",
            WireOrderType::FillOrKill => "fill-or-kill",
            WireOrderType::ExchangeMarket => "exchange market",
            WireOrderType::ExchangeLimit => "exchange limit",
            WireOrderType::ExchangeStop => "exchange stop",
            WireOrderType::ExchangeTrailingStop => "exchange trailing-stop",
            WireOrderType::ExchangeFillOrKill => "exchange fill-or-kill",
        }
    }

    /// Account type whose wallet this order type trades against.
    pub fn account_type(&self) -> AccountType {
        match self {
            WireOrderType::Market
            | WireOrderType::Limit
            | WireOrderType::Stop
            | WireOrderType::TrailingStop
            | WireOrderType::FillOrKill => AccountType::Margin,
            WireOrderType::ExchangeMarket
            | WireOrderType::ExchangeLimit
            | WireOrderType::ExchangeStop
            | WireOrderType::ExchangeTrailingStop
            | WireOrderType::ExchangeFillOrKill => AccountType::Cash,
        }
    }

    /// Parse a raw type string, case-insensitive and whitespace tolerant.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == normalized)
    }
}
