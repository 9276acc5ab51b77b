/*
[INPUT]:  API secret and payload bytes
[OUTPUT]: Hex-encoded HMAC-SHA384 signatures and strictly increasing nonces
[POS]:    Auth layer - cryptographic signing for request authentication
[UPDATE]: When changing signing algorithm or nonce format
*/

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha384;

type HmacSha384 = Hmac<Sha384>;

/// HMAC-SHA384 signer keyed by the API secret
#[derive(Clone)]
pub struct HmacSigner {
    secret: Vec<u8>,
}

impl HmacSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Sign a payload and return the lowercase hex digest
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac =
            HmacSha384::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner").finish_non_exhaustive()
    }
}

/// Strictly increasing nonce source, seeded from wall-clock microseconds
#[derive(Debug)]
pub struct NonceGenerator {
    last: AtomicU64,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> u64 {
        let now = Utc::now().timestamp_micros().max(0) as u64;
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current + 1);
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for NonceGenerator {
    fn default() -> Self {
        Self::new()
    }
}
