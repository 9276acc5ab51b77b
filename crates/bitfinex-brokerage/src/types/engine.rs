/*
[INPUT]:  Engine-side identities (symbols, orders) and normalized exchange data
[OUTPUT]: Value types exchanged between the brokerage and the trading engine
[POS]:    Data layer - engine-facing domain types
[UPDATE]: When the engine contract (orders, ticks, events) changes
*/

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{OrderStatus, OrderType, SecurityType};

pub const MARKET_BITFINEX: &str = "bitfinex";

/// Engine-native security identity.
///
/// `value` is always upper case, `market` always lower case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol {
    pub value: String,
    pub security_type: SecurityType,
    pub market: String,
}

impl Symbol {
    pub fn new(value: &str, security_type: SecurityType, market: &str) -> Self {
        Self {
            value: value.trim().to_ascii_uppercase(),
            security_type,
            market: market.trim().to_ascii_lowercase(),
        }
    }

    /// Crypto symbol on this exchange.
    pub fn crypto(value: &str) -> Self {
        Self::new(value, SecurityType::Crypto, MARKET_BITFINEX)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// A supported currency pair with both of its identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
    /// Exchange-native pair, upper case (e.g. `BTCUSD`)
    pub raw: String,
    pub symbol: Symbol,
}

impl TradingPair {
    /// Pair string as sent in REST request bodies.
    pub fn wire_symbol(&self) -> String {
        self.raw.to_ascii_lowercase()
    }
}

/// An order as issued by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Engine-assigned id, stable for the order's lifetime
    pub id: u64,
    pub symbol: Symbol,
    /// Signed target quantity; negative sells
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    /// Exchange ids known for this order, oldest first
    pub broker_ids: Vec<i64>,
    pub status: OrderStatus,
}

impl Order {
    pub fn market(id: u64, symbol: Symbol, quantity: Decimal) -> Self {
        Self::with_type(id, symbol, quantity, OrderType::Market, None, None)
    }

    pub fn limit(id: u64, symbol: Symbol, quantity: Decimal, limit_price: Decimal) -> Self {
        Self::with_type(id, symbol, quantity, OrderType::Limit, Some(limit_price), None)
    }

    pub fn stop_market(id: u64, symbol: Symbol, quantity: Decimal, stop_price: Decimal) -> Self {
        Self::with_type(id, symbol, quantity, OrderType::StopMarket, None, Some(stop_price))
    }

    pub fn stop_limit(
        id: u64,
        symbol: Symbol,
        quantity: Decimal,
        stop_price: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self::with_type(
            id,
            symbol,
            quantity,
            OrderType::StopLimit,
            Some(limit_price),
            Some(stop_price),
        )
    }

    fn with_type(
        id: u64,
        symbol: Symbol,
        quantity: Decimal,
        order_type: OrderType,
        limit_price: Option<Decimal>,
        stop_price: Option<Decimal>,
    ) -> Self {
        Self {
            id,
            symbol,
            quantity,
            order_type,
            limit_price,
            stop_price,
            broker_ids: Vec::new(),
            status: OrderStatus::New,
        }
    }

    /// Price the order is submitted at, if its type carries one.
    pub fn trigger_price(&self) -> Option<Decimal> {
        match self.order_type {
            OrderType::Market => None,
            OrderType::Limit => self.limit_price,
            OrderType::StopMarket | OrderType::StopLimit => self.stop_price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickKind {
    Quote,
    Trade,
}

/// Normalized market data point queued for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub kind: TickKind,
    /// Mid price for quotes, trade price for trades
    pub value: Decimal,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub bid_size: Decimal,
    pub ask_size: Decimal,
    /// Trade size; zero for quotes
    pub quantity: Decimal,
}

impl Tick {
    pub fn trade(symbol: Symbol, time: DateTime<Utc>, price: Decimal, quantity: Decimal) -> Self {
        Self {
            symbol,
            time,
            kind: TickKind::Trade,
            value: price,
            bid_price: Decimal::ZERO,
            ask_price: Decimal::ZERO,
            bid_size: Decimal::ZERO,
            ask_size: Decimal::ZERO,
            quantity,
        }
    }
}

/// A position or non-quote balance surfaced to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub average_price: Decimal,
    pub market_price: Decimal,
    pub currency: String,
}

/// A cash line of the configured wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct CashAmount {
    pub currency: String,
    pub amount: Decimal,
    /// Price of one unit in the account currency; zero when unknown
    pub conversion_rate: Decimal,
}

impl CashAmount {
    pub fn value_in_account_currency(&self) -> Decimal {
        self.amount * self.conversion_rate
    }
}

/// Order lifecycle notification.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    pub order_id: u64,
    pub broker_id: Option<i64>,
    pub symbol: Symbol,
    /// Signed quantity filled by this event only
    pub fill_quantity: Decimal,
    pub fill_price: Decimal,
    /// Fee of this event only, in quote-currency terms when convertible
    pub fee: Decimal,
    pub fee_currency: String,
    pub status: OrderStatus,
    pub message: String,
}

impl OrderEvent {
    /// Status-only event with no fill attached.
    pub fn status(order_id: u64, symbol: Symbol, status: OrderStatus, message: impl Into<String>) -> Self {
        Self {
            order_id,
            broker_id: None,
            symbol,
            fill_quantity: Decimal::ZERO,
            fill_price: Decimal::ZERO,
            fee: Decimal::ZERO,
            fee_currency: String::new(),
            status,
            message: message.into(),
        }
    }
}

/// Wallet balance change.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountEvent {
    pub currency: String,
    pub balance: Decimal,
}

/// Notifications raised by the brokerage.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerageEvent {
    OrderStatusChanged(OrderEvent),
    AccountChanged(AccountEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_normalizes_case() {
        let symbol = Symbol::new(" btcusd ", SecurityType::Crypto, "Bitfinex");
        assert_eq!(symbol.value, "BTCUSD");
        assert_eq!(symbol.market, MARKET_BITFINEX);
        assert_eq!(symbol, Symbol::crypto("BTCUSD"));
        assert_eq!(symbol.to_string(), "BTCUSD");
    }

    #[test]
    fn order_trigger_price_by_type() {
        let symbol = Symbol::crypto("ETHUSD");
        let market = Order::market(1, symbol.clone(), Decimal::ONE);
        let limit = Order::limit(2, symbol.clone(), Decimal::ONE, Decimal::new(300, 0));
        let stop = Order::stop_market(3, symbol, Decimal::ONE, Decimal::new(250, 0));

        assert_eq!(market.trigger_price(), None);
        assert_eq!(limit.trigger_price(), Some(Decimal::new(300, 0)));
        assert_eq!(stop.trigger_price(), Some(Decimal::new(250, 0)));
        assert_eq!(stop.status, OrderStatus::New);
    }
}
