/*
[INPUT]:  Exchange pair identifiers
[OUTPUT]: Ticker snapshots
[POS]:    HTTP layer - public market data endpoints (no auth required)
[UPDATE]: When adding new public endpoints or changing response format
*/

use crate::http::{BitfinexClient, Result};
use crate::types::TickerRecord;
use reqwest::Method;

impl BitfinexClient {
    /// Query the ticker for one pair
    ///
    /// GET /v1/pubticker/{pair}
    pub async fn ticker(&self, pair: &str) -> Result<TickerRecord> {
        let endpoint = format!("/v1/pubticker/{}", pair.to_ascii_lowercase());
        let builder = self.public_request(Method::GET, &endpoint)?;
        self.send_json(builder).await
    }
}
