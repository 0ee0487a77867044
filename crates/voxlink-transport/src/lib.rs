//! Voxlink Transport Layer
//!
//! The duplex message transport the protocol engine runs on, expressed as
//! async traits, plus the WebSocket binding used by devices:
//! - [`Transport`]: connect with pre-set headers
//! - [`TransportSender`]: send binary or text, report liveness, close
//! - [`TransportReceiver`]: inbound data and disconnect notifications

pub mod error;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{ConnectRequest, Transport, TransportEvent, TransportReceiver, TransportSender};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketReceiver, WebSocketSender, WebSocketTransport};
