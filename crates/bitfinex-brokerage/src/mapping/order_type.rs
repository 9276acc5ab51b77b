/*
[INPUT]:  Engine order types, raw exchange order-type strings, account type
[OUTPUT]: Wire order-type strings and engine order types
[POS]:    Mapping layer - order-type vocabulary per wallet
[UPDATE]: When the exchange adds order types or wallets
*/

use crate::http::{BitfinexError, Result};
use crate::types::{AccountType, OrderType, WireOrderType};

/// Order-type translation bound to one account type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTypeMapper {
    account_type: AccountType,
}

impl OrderTypeMapper {
    pub fn new(account_type: AccountType) -> Self {
        Self { account_type }
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    /// Wire type for an engine order type in this account mode.
    pub fn to_wire(&self, order_type: OrderType) -> Result<WireOrderType> {
        let wire = match (self.account_type, order_type) {
            (AccountType::Cash, OrderType::Market) => WireOrderType::ExchangeMarket,
            (AccountType::Cash, OrderType::Limit) => WireOrderType::ExchangeLimit,
            (AccountType::Cash, OrderType::StopMarket) => WireOrderType::ExchangeStop,
            (AccountType::Margin, OrderType::Market) => WireOrderType::Market,
            (AccountType::Margin, OrderType::Limit) => WireOrderType::Limit,
            (AccountType::Margin, OrderType::StopMarket) => WireOrderType::Stop,
            (_, OrderType::StopLimit) => {
                return Err(BitfinexError::UnsupportedOrderType(format!(
                    "{order_type:?} is not supported for {:?} accounts",
                    self.account_type
                )));
            }
        };
        Ok(wire)
    }

    /// Wire string for an engine order type in this account mode.
    pub fn to_brokerage(&self, order_type: OrderType) -> Result<&'static str> {
        self.to_wire(order_type).map(|wire| wire.as_str())
    }

    /// Engine order type for a raw exchange string.
    ///
    /// Strings of the other wallet's family fail, as do trailing-stop and
    /// fill-or-kill which have no engine counterpart.
    pub fn from_brokerage(&self, raw: &str) -> Result<OrderType> {
        let wire = WireOrderType::parse(raw).ok_or_else(|| {
            BitfinexError::UnsupportedOrderType(format!("unknown exchange order type: {raw}"))
        })?;

        if wire.account_type() != self.account_type {
            return Err(BitfinexError::UnsupportedOrderType(format!(
                "{raw} belongs to {:?} accounts, configured for {:?}",
                wire.account_type(),
                self.account_type
            )));
        }

        match wire {
            WireOrderType::Market | WireOrderType::ExchangeMarket => Ok(OrderType::Market),
            WireOrderType::Limit | WireOrderType::ExchangeLimit => Ok(OrderType::Limit),
            WireOrderType::Stop | WireOrderType::ExchangeStop => Ok(OrderType::StopMarket),
            WireOrderType::TrailingStop
            | WireOrderType::ExchangeTrailingStop
            | WireOrderType::FillOrKill
            | WireOrderType::ExchangeFillOrKill => Err(BitfinexError::UnsupportedOrderType(
                format!("{raw} has no engine order type"),
            )),
        }
    }
}
