//! Client error types

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("connection failed after {attempts} attempts")]
    ConnectFailed { attempts: u32 },

    #[error("server hello not received in time")]
    HandshakeTimeout,

    #[error("audio channel closed while opening")]
    Cancelled,

    #[error("not connected")]
    NotConnected,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] voxlink_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] voxlink_transport::TransportError),
}

/// Network failure categories reported to the error observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    ServerNotFound,
    ServerNotConnected,
    ServerTimeout,
    ServerError,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NetworkErrorKind::ServerNotFound => "Server not found",
            NetworkErrorKind::ServerNotConnected => "Unable to connect to server",
            NetworkErrorKind::ServerTimeout => "Server response timed out",
            NetworkErrorKind::ServerError => "Server error",
        };
        f.write_str(text)
    }
}
