/*
[INPUT]:  HTTP configuration (base URL, timeouts, credentials)
[OUTPUT]: Configured reqwest client and typed JSON responses
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::auth::{ApiCredentials, NonceGenerator};
use crate::config::DEFAULT_REST_BASE_URL;
use crate::http::signature::{HEADER_API_KEY, HEADER_PAYLOAD, HEADER_SIGNATURE, RequestSigner};
use crate::http::{BitfinexError, Result};
use crate::types::ErrorResponse;

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// REST gateway to the exchange
#[derive(Debug, Clone)]
pub struct BitfinexClient {
    http_client: Client,
    base_url: Url,
    signer: Option<RequestSigner>,
    nonces: Arc<NonceGenerator>,
}

impl BitfinexClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Self::with_config_and_base_url(config, DEFAULT_REST_BASE_URL)
    }

    /// Create a new client against a specific base URL
    pub fn with_config_and_base_url(config: ClientConfig, base_url: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
            signer: None,
            nonces: Arc::new(NonceGenerator::new()),
        })
    }

    /// Set credentials for authenticated requests
    pub fn set_credentials(&mut self, credentials: &ApiCredentials) {
        self.signer = Some(RequestSigner::new(credentials));
    }

    /// Share a nonce source with another authenticated component
    pub fn set_nonce_generator(&mut self, nonces: Arc<NonceGenerator>) {
        self.nonces = nonces;
    }

    pub fn nonce_generator(&self) -> Arc<NonceGenerator> {
        self.nonces.clone()
    }

    /// Get the request signer if credentials are set
    pub fn signer(&self) -> Option<&RequestSigner> {
        self.signer.as_ref()
    }

    /// Build request builder for public endpoints
    pub(crate) fn public_request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(endpoint)?;
        Ok(self.http_client.request(method, url))
    }

    /// Build a signed POST for authenticated endpoints
    pub(crate) fn signed_request(&self, endpoint: &str, body: Value) -> Result<RequestBuilder> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            BitfinexError::Credentials("authenticated endpoint requires credentials".to_string())
        })?;

        let url = self.base_url.join(endpoint)?;
        let signed = signer.sign_body(endpoint, self.nonces.next(), body)?;

        Ok(self
            .http_client
            .request(Method::POST, url)
            .header(HEADER_API_KEY, signer.api_key())
            .header(HEADER_PAYLOAD, signed.payload)
            .header(HEADER_SIGNATURE, signed.signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(signed.body))
    }

    /// Send a request and decode the JSON body
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(BitfinexError::RateLimit { retry_after });
        }

        let body = response.text().await?;
        debug!(%status, bytes = body.len(), "rest response received");

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .map(|err| err.message)
                .filter(|message| !message.is_empty())
                .unwrap_or(body);
            return Err(BitfinexError::api_error(status, message));
        }

        Ok(serde_json::from_str(&body)?)
    }
}
