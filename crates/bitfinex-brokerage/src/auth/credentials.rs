/*
[INPUT]:  API key and secret from configuration
[OUTPUT]: Validated credentials with a redacted Debug representation
[POS]:    Auth layer - credential storage
[UPDATE]: When credential sources or validation rules change
*/

use crate::http::{BitfinexError, Result};

use super::HmacSigner;

/// API key pair for authenticated REST calls and the account channel
#[derive(Clone)]
pub struct ApiCredentials {
    api_key: String,
    api_secret: String,
}

impl ApiCredentials {
    /// Create credentials, rejecting empty key or secret
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into().trim().to_string();
        let api_secret = api_secret.into().trim().to_string();

        if api_key.is_empty() {
            return Err(BitfinexError::Credentials("API key is empty".to_string()));
        }
        if api_secret.is_empty() {
            return Err(BitfinexError::Credentials("API secret is empty".to_string()));
        }

        Ok(Self { api_key, api_secret })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Signer keyed by the API secret
    pub fn signer(&self) -> HmacSigner {
        HmacSigner::new(&self.api_secret)
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}
