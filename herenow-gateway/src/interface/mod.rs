pub mod connection;
pub mod http;
pub mod websocket;

pub use connection::{CloseReason, ConnectionLifecycle, ConnectionOutcome, ConnectionState, InboundFrame};
