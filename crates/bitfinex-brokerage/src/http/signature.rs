/*
[INPUT]:  Request path, JSON body, nonce and API credentials
[OUTPUT]: Signed payload headers (X-BFX-APIKEY/PAYLOAD/SIGNATURE) and WS auth frame
[POS]:    HTTP layer - request signing for authenticated endpoints
[UPDATE]: When changing signing algorithm or header format
*/

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::{Map, Value};

use crate::auth::{ApiCredentials, HmacSigner};
use crate::http::{BitfinexError, Result};

pub const HEADER_API_KEY: &str = "X-BFX-APIKEY";
pub const HEADER_PAYLOAD: &str = "X-BFX-PAYLOAD";
pub const HEADER_SIGNATURE: &str = "X-BFX-SIGNATURE";

/// A body ready to post together with its authentication headers
#[derive(Debug, Clone, PartialEq)]
pub struct SignedPayload {
    pub body: String,
    pub payload: String,
    pub signature: String,
}

/// Signs HTTP request bodies and the WebSocket auth message
#[derive(Debug, Clone)]
pub struct RequestSigner {
    api_key: String,
    signer: HmacSigner,
}

impl RequestSigner {
    pub fn new(credentials: &ApiCredentials) -> Self {
        Self {
            api_key: credentials.api_key().to_string(),
            signer: credentials.signer(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Sign a request body
    ///
    /// The body object gains `request` (the path) and `nonce`; the payload is
    /// base64(body) and the signature hex(HMAC-SHA384(secret, payload)).
    pub fn sign_body(&self, path: &str, nonce: u64, body: Value) -> Result<SignedPayload> {
        let mut object = match body {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(BitfinexError::InvalidResponse(format!(
                    "request body must be a JSON object, got {other}"
                )));
            }
        };
        object.insert("request".to_string(), Value::String(path.to_string()));
        object.insert("nonce".to_string(), Value::String(nonce.to_string()));

        let body = Value::Object(object).to_string();
        let payload = BASE64.encode(body.as_bytes());
        let signature = self.signer.sign(payload.as_bytes());

        Ok(SignedPayload {
            body,
            payload,
            signature,
        })
    }

    /// Authentication frame for the account channel
    pub fn ws_auth_message(&self, nonce: u64) -> Value {
        let payload = format!("AUTH{nonce}");
        let signature = self.signer.sign(payload.as_bytes());
        serde_json::json!({
            "event": "auth",
            "apiKey": self.api_key,
            "authNonce": nonce.to_string(),
            "authPayload": payload,
            "authSig": signature,
        })
    }
}
