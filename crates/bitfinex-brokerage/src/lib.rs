/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Bitfinex brokerage crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod brokerage;
pub mod config;
pub mod http;
pub mod ledger;
pub mod mapping;
pub mod ticks;
pub mod types;
pub mod ws;

// Re-export commonly used types from auth
pub use auth::{ApiCredentials, HmacSigner, NonceGenerator};

pub use brokerage::{BitfinexBrokerage, EngineContext, NoEngineContext};
pub use config::{BrokerageConfig, InfoCodes};

// Re-export commonly used types from http
pub use http::{BitfinexClient, BitfinexError, ClientConfig, RequestSigner, Result};

pub use ledger::{Execution, FillAccumulator, OrderLedger};
pub use mapping::{OrderTypeMapper, ScaleFactor, SymbolMapper};
pub use ticks::{LastPrices, PendingTicks};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{ConnectionState, ControlAction, SessionConfig, WebSocketSession};
