//! Endpoint address and authorization policy
//!
//! Only encrypted endpoints are accepted. A plain `ws://` address is
//! upgraded to `wss://`; any other scheme is rejected before anything
//! touches the network.

use tracing::{error, warn};

use crate::{Error, Result, INSECURE_SCHEME, SECURE_SCHEME};

/// Prefix added to bare tokens
pub const BEARER_PREFIX: &str = "Bearer ";

/// Apply the scheme policy to an endpoint address.
///
/// The address itself is never logged, it may carry credentials in the
/// query string.
pub fn normalize_endpoint(url: &str) -> Result<String> {
    if let Some(rest) = url.strip_prefix(INSECURE_SCHEME) {
        warn!("Insecure ws:// endpoint, upgrading to wss://");
        return Ok(format!("{}{}", SECURE_SCHEME, rest));
    }

    if url.starts_with(SECURE_SCHEME) {
        return Ok(url.to_string());
    }

    error!("Invalid endpoint address, a wss:// URL is required");
    let scheme = url.split("://").next().filter(|s| *s != url).unwrap_or("");
    Err(Error::InvalidAddress(format!(
        "unsupported scheme '{}', expected wss://",
        scheme
    )))
}

/// Value for the `Authorization` header.
///
/// A token containing a space is taken to be a complete header value
/// (e.g. `"Basic abc"`); anything else gets the bearer prefix. An empty
/// token means no header at all.
pub fn authorization_value(token: &str) -> Option<String> {
    if token.is_empty() {
        None
    } else if token.contains(' ') {
        Some(token.to_string())
    } else {
        Some(format!("{}{}", BEARER_PREFIX, token))
    }
}
