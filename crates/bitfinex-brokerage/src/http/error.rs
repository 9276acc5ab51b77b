/*
[INPUT]:  Error sources (HTTP, API, serialization, validation, WebSocket)
[OUTPUT]: Structured error types with context and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the Bitfinex brokerage
#[derive(Error, Debug)]
pub enum BitfinexError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error (code {code}): {message}")]
    Api { code: i32, message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Operation needs a live socket
    #[error("WebSocket not connected")]
    NotConnected,

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or empty API credentials
    #[error("Invalid credentials: {0}")]
    Credentials(String),

    /// Symbol is empty, unknown, or belongs to another market
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Order type cannot be expressed for the configured account type
    #[error("Unsupported order type: {0}")]
    UnsupportedOrderType(String),

    /// Quantity or price outside the representable decimal range
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimit { retry_after: u64 },

    /// Connection timeout
    #[error("Connection timeout after {duration}s")]
    Timeout { duration: u64 },
}

impl BitfinexError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BitfinexError::Http(_)
                | BitfinexError::RateLimit { .. }
                | BitfinexError::Timeout { .. }
                | BitfinexError::WebSocket(_)
                | BitfinexError::InvalidResponse(_)
        )
    }

    /// Get retry delay in seconds (if retryable)
    pub fn retry_delay(&self) -> Option<u64> {
        match self {
            BitfinexError::RateLimit { retry_after } => Some(*retry_after),
            BitfinexError::Timeout { .. } => Some(1),
            _ => None,
        }
    }

    /// Check if the error is a caller-side validation failure.
    ///
    /// These fail fast and are never worth retrying.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            BitfinexError::InvalidSymbol(_)
                | BitfinexError::UnsupportedOrderType(_)
                | BitfinexError::OutOfRange(_)
                | BitfinexError::Credentials(_)
                | BitfinexError::Config(_)
        )
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        BitfinexError::Api {
            code: status.as_u16() as i32,
            message: message.into(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BitfinexError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BitfinexError::WebSocket(err.to_string())
    }
}

/// Result type alias for Bitfinex operations
pub type Result<T> = std::result::Result<T, BitfinexError>;
