/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for bitfinex-brokerage tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use bitfinex_brokerage::{
    AccountType, ApiCredentials, BitfinexBrokerage, BitfinexClient, BrokerageConfig,
    ClientConfig, EngineContext, Symbol,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use wiremock::MockServer;

pub const TEST_API_KEY: &str = "test-api-key";
pub const TEST_API_SECRET: &str = "test-api-secret";

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Signed REST client pointed at the mock server
pub fn test_client(server: &MockServer) -> BitfinexClient {
    let mut client = BitfinexClient::with_config_and_base_url(ClientConfig::default(), &server.uri())
        .expect("client should build");
    client.set_credentials(
        &ApiCredentials::new(TEST_API_KEY, TEST_API_SECRET).expect("credentials should be valid"),
    );
    client
}

pub fn test_config(server: &MockServer, account_type: AccountType) -> BrokerageConfig {
    let mut config = BrokerageConfig::new(TEST_API_KEY, TEST_API_SECRET, account_type);
    config.rest_base_url = server.uri();
    config.ws_url = "ws://127.0.0.1:1".to_string();
    config
}

/// Engine stand-in with settable holdings and prices
#[derive(Debug, Default)]
pub struct MockEngine {
    holdings: Mutex<HashMap<String, Decimal>>,
    prices: Mutex<HashMap<String, Decimal>>,
}

impl MockEngine {
    pub fn set_holdings(&self, symbol: &str, quantity: Decimal) {
        self.holdings.lock().insert(symbol.to_string(), quantity);
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().insert(symbol.to_string(), price);
    }
}

impl EngineContext for MockEngine {
    fn holdings_quantity(&self, symbol: &Symbol) -> Decimal {
        self.holdings
            .lock()
            .get(&symbol.value)
            .copied()
            .unwrap_or_default()
    }

    fn last_price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.prices.lock().get(&symbol.value).copied()
    }
}

pub fn test_brokerage(
    server: &MockServer,
    account_type: AccountType,
) -> (BitfinexBrokerage, Arc<MockEngine>) {
    let engine = Arc::new(MockEngine::default());
    let brokerage = BitfinexBrokerage::new(test_config(server, account_type), engine.clone())
        .expect("brokerage should build");
    (brokerage, engine)
}

/// Order status record as the exchange returns it
pub fn order_record(id: i64, symbol: &str, side: &str, order_type: &str, price: &str, amount: &str) -> Value {
    json!({
        "id": id,
        "symbol": symbol,
        "exchange": "bitfinex",
        "price": price,
        "avg_execution_price": "0.0",
        "side": side,
        "type": order_type,
        "timestamp": "1444272165.252370982",
        "is_live": true,
        "is_cancelled": false,
        "original_amount": amount,
        "remaining_amount": amount,
        "executed_amount": "0.0"
    })
}

/// Final account execution frame for `broker_id`
pub fn execution_frame(
    trade_id: i64,
    broker_id: i64,
    pair: &str,
    amount: &str,
    price: &str,
    fee: &str,
    fee_currency: &str,
) -> String {
    json!([
        0,
        "tu",
        [
            trade_id,
            format!("{trade_id}-{pair}"),
            pair,
            1443659698,
            broker_id,
            amount,
            price,
            "EXCHANGE LIMIT",
            price,
            fee,
            fee_currency
        ]
    ])
    .to_string()
}
