//! Client builder pattern

use std::sync::Arc;
use std::time::Duration;
use voxlink_core::WireVersion;
use voxlink_transport::{Transport, WebSocketTransport};

use crate::config::{ProtocolConfig, SettingsStore};
use crate::error::Result;
use crate::websocket::WebsocketProtocol;

/// Builder for a protocol instance
pub struct VoxlinkBuilder {
    config: ProtocolConfig,
    settings: Option<Arc<dyn SettingsStore>>,
}

impl VoxlinkBuilder {
    /// Create a new builder
    pub fn new(url: &str) -> Self {
        Self {
            config: ProtocolConfig::new(url),
            settings: None,
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: ProtocolConfig) -> Self {
        Self {
            config,
            settings: None,
        }
    }

    /// Set access token
    pub fn token(mut self, token: &str) -> Self {
        self.config.token = Some(token.to_string());
        self
    }

    /// Set wire version
    pub fn version(mut self, version: WireVersion) -> Self {
        self.config.version = version.as_u16();
        self
    }

    pub fn device_id(mut self, device_id: &str) -> Self {
        self.config.device_id = device_id.to_string();
        self
    }

    pub fn client_id(mut self, client_id: &str) -> Self {
        self.config.client_id = client_id.to_string();
        self
    }

    /// Announce server-side echo cancellation
    pub fn aec(mut self, enabled: bool) -> Self {
        self.config.features.aec = enabled;
        self
    }

    pub fn mcp(mut self, enabled: bool) -> Self {
        self.config.features.mcp = enabled;
        self
    }

    /// Outbound frame duration in milliseconds
    pub fn frame_duration(mut self, ms: u32) -> Self {
        self.config.audio.frame_duration = ms;
        self
    }

    pub fn connect_attempts(mut self, attempts: u32) -> Self {
        self.config.connect_attempts = attempts;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn channel_timeout(mut self, timeout: Duration) -> Self {
        self.config.channel_timeout_secs = timeout.as_secs();
        self
    }

    /// Set reconnect cooldown
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Device settings consulted at every open for url, token and version
    pub fn settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Build over the WebSocket transport
    pub fn build(self) -> Result<WebsocketProtocol<WebSocketTransport>> {
        self.build_with(WebSocketTransport::new())
    }

    /// Build over any transport
    pub fn build_with<T: Transport>(self, transport: T) -> Result<WebsocketProtocol<T>> {
        let protocol = WebsocketProtocol::new(transport, self.config)?;
        Ok(match self.settings {
            Some(settings) => protocol.with_settings(settings),
            None => protocol,
        })
    }
}
