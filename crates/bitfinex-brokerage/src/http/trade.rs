/*
[INPUT]:  Order requests signed with the account secret
[OUTPUT]: Exchange order records
[POS]:    HTTP layer - trading endpoints (require auth + body signature)
[UPDATE]: When adding new trading endpoints or changing order flow
*/

use crate::http::{BitfinexClient, Result};
use crate::types::{CancelOrderRequest, NewOrderRequest, OrderRecord, ReplaceOrderRequest};

impl BitfinexClient {
    /// Submit a new order
    ///
    /// POST /v1/order/new
    pub async fn new_order(&self, req: &NewOrderRequest) -> Result<OrderRecord> {
        let builder = self.signed_request("/v1/order/new", serde_json::to_value(req)?)?;
        self.send_json(builder).await
    }

    /// Cancel an order by exchange id
    ///
    /// POST /v1/order/cancel
    pub async fn cancel_order(&self, order_id: i64) -> Result<OrderRecord> {
        let req = CancelOrderRequest { order_id };
        let builder = self.signed_request("/v1/order/cancel", serde_json::to_value(&req)?)?;
        self.send_json(builder).await
    }

    /// Atomically cancel an order and submit its replacement
    ///
    /// POST /v1/order/cancel/replace
    /// The returned record carries the replacement's new id.
    pub async fn replace_order(&self, req: &ReplaceOrderRequest) -> Result<OrderRecord> {
        let builder =
            self.signed_request("/v1/order/cancel/replace", serde_json::to_value(req)?)?;
        self.send_json(builder).await
    }
}

#[cfg(test)]
mod tests {
    use crate::auth::ApiCredentials;
    use crate::http::{BitfinexClient, BitfinexError, ClientConfig};
    use crate::types::{EXCHANGE_NAME, NewOrderRequest, ReplaceOrderRequest, Side};
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> BitfinexClient {
        let mut client =
            BitfinexClient::with_config_and_base_url(ClientConfig::default(), &server.uri())
                .expect("client init");
        client.set_credentials(&ApiCredentials::new("key", "secret").unwrap());
        client
    }

    fn order_json(id: i64, side: &str, order_type: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "symbol": "btcusd",
            "exchange": "bitfinex",
            "price": "250.0",
            "avg_execution_price": "0.0",
            "side": side,
            "type": order_type,
            "timestamp": "1444272165.252370982",
            "is_live": true,
            "is_cancelled": false,
            "original_amount": "0.5",
            "remaining_amount": "0.5",
            "executed_amount": "0.0"
        })
    }

    #[tokio::test]
    async fn test_new_order() {
        let server = MockServer::start().await;
        let _mock = Mock::given(method("POST"))
            .and(path("/v1/order/new"))
            .and(body_partial_json(serde_json::json!({
                "request": "/v1/order/new",
                "symbol": "btcusd",
                "amount": "0.5",
                "price": "250",
                "side": "buy",
                "type": "exchange limit",
                "exchange": "bitfinex"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(order_json(448364249, "buy", "exchange limit")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let req = NewOrderRequest {
            symbol: "btcusd".to_string(),
            amount: dec!(0.5),
            price: dec!(250),
            exchange: EXCHANGE_NAME.to_string(),
            side: Side::Buy,
            order_type: "exchange limit".to_string(),
        };
        let record = client_for(&server).new_order(&req).await.expect("new_order");
        assert_eq!(record.id, 448364249);
        assert!(record.is_live);
        assert_eq!(record.remaining_amount, dec!(0.5));
    }

    #[tokio::test]
    async fn test_new_order_rejected() {
        let server = MockServer::start().await;
        let _mock = Mock::given(method("POST"))
            .and(path("/v1/order/new"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "message": "Invalid order: minimum size for BTC/USD is 0.01"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let req = NewOrderRequest {
            symbol: "btcusd".to_string(),
            amount: dec!(0.0001),
            price: dec!(250),
            exchange: EXCHANGE_NAME.to_string(),
            side: Side::Sell,
            order_type: "exchange limit".to_string(),
        };
        let err = client_for(&server).new_order(&req).await.unwrap_err();
        assert!(matches!(err, BitfinexError::Api { code: 400, .. }));
    }

    #[tokio::test]
    async fn test_cancel_order() {
        let server = MockServer::start().await;
        let mut body = order_json(446915287, "sell", "trailing-stop");
        body["is_live"] = serde_json::json!(false);
        body["is_cancelled"] = serde_json::json!(true);

        let _mock = Mock::given(method("POST"))
            .and(path("/v1/order/cancel"))
            .and(body_partial_json(serde_json::json!({"order_id": 446915287})))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;

        let record = client_for(&server)
            .cancel_order(446915287)
            .await
            .expect("cancel_order");
        assert!(record.is_cancelled);
        assert!(!record.is_live);
    }

    #[tokio::test]
    async fn test_replace_order_returns_new_id() {
        let server = MockServer::start().await;
        let _mock = Mock::given(method("POST"))
            .and(path("/v1/order/cancel/replace"))
            .and(body_partial_json(serde_json::json!({
                "order_id": 100,
                "price": "260",
                "type": "limit"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(order_json(101, "buy", "limit")))
            .expect(1)
            .mount(&server)
            .await;

        let req = ReplaceOrderRequest {
            order_id: 100,
            symbol: "btcusd".to_string(),
            amount: dec!(0.5),
            price: dec!(260),
            exchange: EXCHANGE_NAME.to_string(),
            side: Side::Buy,
            order_type: "limit".to_string(),
        };
        let record = client_for(&server).replace_order(&req).await.expect("replace");
        assert_eq!(record.id, 101);
    }
}
