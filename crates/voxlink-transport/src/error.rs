//! Transport error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The server answered the upgrade with a non-101 status
    #[error("connection rejected with status {0}")]
    Rejected(u16),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid header {0}")]
    InvalidHeader(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Numeric code for logs: the HTTP status of a rejected upgrade,
    /// otherwise a fixed negative value per kind.
    pub fn code(&self) -> i32 {
        match self {
            TransportError::Rejected(status) => *status as i32,
            TransportError::ConnectionFailed(_) => -1,
            TransportError::ConnectionClosed => -2,
            TransportError::SendFailed(_) => -3,
            TransportError::InvalidUrl(_) => -4,
            TransportError::InvalidHeader(_) => -5,
            TransportError::Timeout => -6,
            TransportError::Io(_) => -7,
            TransportError::NotConnected => -8,
            TransportError::Other(_) => -99,
        }
    }
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match e {
            WsError::Http(response) => TransportError::Rejected(response.status().as_u16()),
            WsError::Io(io) => TransportError::Io(io),
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                TransportError::ConnectionClosed
            }
            WsError::Url(url) => TransportError::InvalidUrl(url.to_string()),
            other => TransportError::ConnectionFailed(other.to_string()),
        }
    }
}
