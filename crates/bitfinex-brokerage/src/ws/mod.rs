/*
[INPUT]:  Session configuration and the pairs to stream
[OUTPUT]: Ticks, order fills and wallet updates from the exchange
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding new channels or changing connection logic
*/

pub mod channels;
pub mod client;
pub mod message;

pub use channels::{ChannelBinding, ChannelKind, ChannelTable};
pub use client::{ConnectionState, ControlAction, SessionConfig, WebSocketSession};
pub use message::{InboundFrame, ServerEvent, TickerSnapshot};
