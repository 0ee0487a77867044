//! Per-channel session state

use std::time::Duration;
use tokio::time::Instant;
use voxlink_core::{NegotiatedParams, WireVersion};

/// State shared between the lifecycle manager and the inbound dispatcher
#[derive(Debug, Clone)]
pub struct ProtocolSession {
    pub params: NegotiatedParams,
    pub wire_version: WireVersion,
    /// Set by `set_error`, cleared by the next open
    pub error: bool,
    /// Last time any inbound message arrived
    pub last_incoming: Instant,
}

impl ProtocolSession {
    pub fn new(wire_version: WireVersion) -> Self {
        Self {
            params: NegotiatedParams::default(),
            wire_version,
            error: false,
            last_incoming: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_incoming = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_incoming.elapsed()
    }

    /// True once the idle time strictly exceeds `limit`
    pub fn is_timed_out(&self, limit: Duration) -> bool {
        self.idle_for() > limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_strict() {
        let session = ProtocolSession::new(WireVersion::V1);
        let limit = Duration::from_secs(120);

        tokio::time::advance(limit).await;
        assert!(!session.is_timed_out(limit));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(session.is_timed_out(limit));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_resets_idle() {
        let mut session = ProtocolSession::new(WireVersion::V3);
        tokio::time::advance(Duration::from_secs(100)).await;
        session.touch();
        tokio::time::advance(Duration::from_secs(100)).await;
        assert!(!session.is_timed_out(Duration::from_secs(120)));
    }
}
