//! Error types for Voxlink core

use thiserror::Error;

/// Result type alias for Voxlink core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Voxlink core error types
#[derive(Error, Debug)]
pub enum Error {
    /// Frame shorter than the header of its wire version
    #[error("truncated header: need {needed} bytes, have {have}")]
    TruncatedHeader { needed: usize, have: usize },

    /// Declared payload length exceeds the bytes that follow the header
    #[error("payload overflow: header declares {declared} bytes, {available} available")]
    PayloadOverflow { declared: usize, available: usize },

    /// Payload does not fit the length field of the wire version
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Wire version outside 1..=3
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u16),

    /// Server hello names a transport other than ours (or none)
    #[error("unsupported transport: {0:?}")]
    UnsupportedTransport(Option<String>),

    /// Control message is not usable JSON
    #[error("malformed control message: {0}")]
    MalformedJson(String),

    /// Endpoint address rejected by the scheme policy
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// JSON serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
