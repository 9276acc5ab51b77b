/*
[INPUT]:  API key/secret from configuration
[OUTPUT]: Signatures, nonces and credentials for authenticated calls
[POS]:    Auth layer - handles Bitfinex API authentication
[UPDATE]: When auth flow or signature methods change
*/

pub mod credentials;
pub mod signer;

pub use credentials::ApiCredentials;
pub use signer::{HmacSigner, NonceGenerator};
