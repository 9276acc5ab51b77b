/*
[INPUT]:  Signed account queries
[OUTPUT]: Open orders, margin positions and wallet balances
[POS]:    HTTP layer - authenticated account endpoints
[UPDATE]: When adding new account endpoints or changing response format
*/

use serde_json::Value;

use crate::http::{BitfinexClient, Result};
use crate::types::{BalanceRecord, OrderRecord, PositionRecord};

impl BitfinexClient {
    /// Query live orders
    ///
    /// POST /v1/orders
    pub async fn active_orders(&self) -> Result<Vec<OrderRecord>> {
        let builder = self.signed_request("/v1/orders", Value::Null)?;
        self.send_json(builder).await
    }

    /// Query open margin positions
    ///
    /// POST /v1/positions
    pub async fn active_positions(&self) -> Result<Vec<PositionRecord>> {
        let builder = self.signed_request("/v1/positions", Value::Null)?;
        self.send_json(builder).await
    }

    /// Query wallet balances across all wallets
    ///
    /// POST /v1/balances
    pub async fn balances(&self) -> Result<Vec<BalanceRecord>> {
        let builder = self.signed_request("/v1/balances", Value::Null)?;
        self.send_json(builder).await
    }
}

#[cfg(test)]
mod tests {
    use crate::auth::ApiCredentials;
    use crate::http::{BitfinexClient, ClientConfig};
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> BitfinexClient {
        let mut client =
            BitfinexClient::with_config_and_base_url(ClientConfig::default(), &server.uri())
                .expect("client init");
        client.set_credentials(&ApiCredentials::new("key", "secret").unwrap());
        client
    }

    #[tokio::test]
    async fn test_active_orders() {
        let server = MockServer::start().await;
        let mock_response = r#"[{
            "id": 448411365,
            "symbol": "btcusd",
            "exchange": "bitfinex",
            "price": "0.02",
            "avg_execution_price": "0.0",
            "side": "buy",
            "type": "exchange limit",
            "timestamp": "1444276597.0",
            "is_live": true,
            "is_cancelled": false,
            "is_hidden": false,
            "was_forced": false,
            "original_amount": "0.02",
            "remaining_amount": "0.02",
            "executed_amount": "0.0"
        }]"#;

        let _mock = Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(mock_response, "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let orders = client_for(&server).active_orders().await.expect("orders");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, 448411365);
        assert_eq!(orders[0].order_type, "exchange limit");
        assert_eq!(orders[0].price, dec!(0.02));
    }

    #[tokio::test]
    async fn test_active_positions() {
        let server = MockServer::start().await;
        let mock_response = r#"[{
            "id": 943715,
            "symbol": "btcusd",
            "status": "ACTIVE",
            "base": "246.94",
            "amount": "-1.0",
            "timestamp": "1444141857.0",
            "swap": "0.0",
            "pl": "-2.22042"
        }]"#;

        let _mock = Mock::given(method("POST"))
            .and(path("/v1/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(mock_response, "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let positions = client_for(&server).active_positions().await.expect("positions");
        assert_eq!(positions[0].amount, dec!(-1.0));
        assert_eq!(positions[0].base, dec!(246.94));
    }

    #[tokio::test]
    async fn test_balances() {
        let server = MockServer::start().await;
        let mock_response = r#"[
            {"type": "deposit", "currency": "btc", "amount": "0.0", "available": "0.0"},
            {"type": "exchange", "currency": "usd", "amount": "1.0", "available": "1.0"},
            {"type": "trading", "currency": "btc", "amount": "2.5", "available": "2.0"}
        ]"#;

        let _mock = Mock::given(method("POST"))
            .and(path("/v1/balances"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(mock_response, "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let balances = client_for(&server).balances().await.expect("balances");
        assert_eq!(balances.len(), 3);
        assert_eq!(balances[2].wallet, "trading");
        assert_eq!(balances[2].amount, dec!(2.5));
    }
}
