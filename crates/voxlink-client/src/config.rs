//! Protocol configuration
//!
//! A [`ProtocolConfig`] can be built in code, parsed from TOML, or read from
//! a device settings store under the `websocket` namespace.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;
use voxlink_core::{AudioParams, ClientFeatures, WireVersion, FRAME_DURATION_RANGE};

use crate::error::{ClientError, Result};

/// Settings namespace holding the endpoint, token and wire version
pub const SETTINGS_NAMESPACE: &str = "websocket";

/// Full configuration of a protocol instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Server endpoint, `wss://` or `ws://`
    pub url: String,
    /// Access token sent in the `Authorization` header
    pub token: Option<String>,
    /// Wire version, 0 means the default
    pub version: u16,
    /// Hardware id sent as `Device-Id`
    pub device_id: String,
    /// Install id sent as `Client-Id`
    pub client_id: String,
    pub features: ClientFeatures,
    pub audio: AudioParams,
    /// Connect attempts per open before giving up
    pub connect_attempts: u32,
    pub retry_delay_ms: u64,
    pub handshake_timeout_ms: u64,
    /// Inbound silence after which the channel counts as dead
    pub channel_timeout_secs: u64,
    /// Cooldown armed by `schedule_reconnect`
    pub reconnect_interval_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: None,
            version: 0,
            device_id: String::new(),
            client_id: uuid::Uuid::new_v4().to_string(),
            features: ClientFeatures::default(),
            audio: AudioParams::default(),
            connect_attempts: 3,
            retry_delay_ms: 1000,
            handshake_timeout_ms: 10_000,
            channel_timeout_secs: 120,
            reconnect_interval_ms: 30_000,
        }
    }
}

impl ProtocolConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read `url`, `token` and `version` from the settings store.
    ///
    /// Keys that are absent keep their defaults.
    pub fn from_settings(settings: &dyn SettingsStore) -> Self {
        let mut config = Self::default();
        config.reload_settings(settings);
        config
    }

    /// Re-read the settings-backed fields, leaving the rest untouched
    pub fn reload_settings(&mut self, settings: &dyn SettingsStore) {
        if let Some(url) = settings.get_string(SETTINGS_NAMESPACE, "url") {
            self.url = url;
        }
        if let Some(token) = settings.get_string(SETTINGS_NAMESPACE, "token") {
            self.token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(version) = settings.get_int(SETTINGS_NAMESPACE, "version") {
            match u16::try_from(version) {
                Ok(v) if v == 0 || WireVersion::from_u16(v).is_some() => self.version = v,
                _ => warn!("Ignoring unsupported protocol version {}", version),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != 0 && WireVersion::from_u16(self.version).is_none() {
            return Err(ClientError::Config(format!(
                "unsupported protocol version {}",
                self.version
            )));
        }
        if !FRAME_DURATION_RANGE.contains(&self.audio.frame_duration) {
            return Err(ClientError::Config(format!(
                "frame duration {} ms outside {}..={}",
                self.audio.frame_duration,
                FRAME_DURATION_RANGE.start(),
                FRAME_DURATION_RANGE.end()
            )));
        }
        if self.connect_attempts == 0 {
            return Err(ClientError::Config("connect_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Configured wire version, falling back to v1
    pub fn wire_version(&self) -> WireVersion {
        WireVersion::from_u16(self.version).unwrap_or_default()
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_timeout_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// Read access to persisted device settings
pub trait SettingsStore: Send + Sync {
    fn get_string(&self, namespace: &str, key: &str) -> Option<String>;
    fn get_int(&self, namespace: &str, key: &str) -> Option<i64>;
}

type SettingsKey = (String, String);

/// In-memory settings store, writable while shared
#[derive(Debug, Default)]
pub struct MemorySettings {
    strings: RwLock<HashMap<SettingsKey, String>>,
    ints: RwLock<HashMap<SettingsKey, i64>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_string(&self, namespace: &str, key: &str, value: impl Into<String>) {
        self.strings
            .write()
            .insert((namespace.to_string(), key.to_string()), value.into());
    }

    pub fn set_int(&self, namespace: &str, key: &str, value: i64) {
        self.ints
            .write()
            .insert((namespace.to_string(), key.to_string()), value);
    }

    pub fn with_string(self, namespace: &str, key: &str, value: impl Into<String>) -> Self {
        self.set_string(namespace, key, value);
        self
    }

    pub fn with_int(self, namespace: &str, key: &str, value: i64) -> Self {
        self.set_int(namespace, key, value);
        self
    }
}

impl SettingsStore for MemorySettings {
    fn get_string(&self, namespace: &str, key: &str) -> Option<String> {
        self.strings
            .read()
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
    }

    fn get_int(&self, namespace: &str, key: &str) -> Option<i64> {
        self.ints
            .read()
            .get(&(namespace.to_string(), key.to_string()))
            .copied()
    }
}
