//! Hello exchange
//!
//! The client opens every session with a hello describing its wire version,
//! capabilities and audio format. The server answers with its own hello,
//! from which the session id and the server's audio parameters are taken.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    Error, Result, WireVersion, AUDIO_FORMAT, CLIENT_CHANNELS, CLIENT_SAMPLE_RATE,
    DEFAULT_FRAME_DURATION_MS, DEFAULT_SERVER_FRAME_DURATION_MS, DEFAULT_SERVER_SAMPLE_RATE,
    FRAME_DURATION_RANGE, SAMPLE_RATE_RANGE,
};

/// Capability flags announced by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientFeatures {
    /// Server-side echo cancellation
    #[serde(skip_serializing_if = "is_false")]
    pub aec: bool,
    /// Model Context Protocol passthrough
    pub mcp: bool,
}

impl Default for ClientFeatures {
    fn default() -> Self {
        Self {
            aec: false,
            mcp: true,
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Audio format announced by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioParams {
    pub format: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub frame_duration: u32,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            format: AUDIO_FORMAT.to_string(),
            sample_rate: CLIENT_SAMPLE_RATE,
            channels: CLIENT_CHANNELS,
            frame_duration: DEFAULT_FRAME_DURATION_MS,
        }
    }
}

/// Client hello message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientHello {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u16,
    pub features: ClientFeatures,
    pub transport: String,
    pub audio_params: AudioParams,
}

impl ClientHello {
    pub fn new(
        version: WireVersion,
        features: ClientFeatures,
        transport: &str,
        audio_params: AudioParams,
    ) -> Self {
        Self {
            kind: "hello".to_string(),
            version: version.as_u16(),
            features,
            transport: transport.to_string(),
            audio_params,
        }
    }

    /// Serialize to compact JSON text
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Fields accepted from a server hello.
///
/// Audio parameters outside their valid range are already dropped here, so
/// a `Some` value is always safe to apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerHello {
    pub session_id: Option<String>,
    pub sample_rate: Option<u32>,
    pub frame_duration: Option<u32>,
}

impl ServerHello {
    /// Validate a server hello against the transport we speak.
    ///
    /// Fails only on a missing, non-string or mismatching `transport`.
    /// Unusable optional fields are skipped with a warning.
    pub fn parse(root: &Value, expected_transport: &str) -> Result<Self> {
        let transport = match root.get("transport").and_then(Value::as_str) {
            Some(t) => t,
            None => {
                error!("Server hello has no valid transport field");
                return Err(Error::UnsupportedTransport(None));
            }
        };
        if transport != expected_transport {
            error!("Unsupported transport in server hello: {}", transport);
            return Err(Error::UnsupportedTransport(Some(transport.to_string())));
        }

        let session_id = root
            .get("session_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(id) = &session_id {
            info!("Session ID: {}", id);
        }

        let mut hello = ServerHello {
            session_id,
            ..Default::default()
        };

        if let Some(params) = root.get("audio_params").filter(|p| p.is_object()) {
            hello.sample_rate = ranged_param(params, "sample_rate", &SAMPLE_RATE_RANGE);
            hello.frame_duration = ranged_param(params, "frame_duration", &FRAME_DURATION_RANGE);
        }

        Ok(hello)
    }
}

fn ranged_param(params: &Value, key: &str, range: &std::ops::RangeInclusive<u32>) -> Option<u32> {
    let raw = params.get(key)?;
    let value = match raw.as_i64() {
        Some(v) => v,
        // Fractional numbers truncate toward zero
        None => raw.as_f64()? as i64,
    };

    if value >= *range.start() as i64 && value <= *range.end() as i64 {
        Some(value as u32)
    } else {
        warn!("Server {} out of range ({}), keeping current value", key, value);
        None
    }
}

/// Session parameters negotiated through the hello exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedParams {
    /// Empty until the server assigns one
    pub session_id: String,
    pub sample_rate: u32,
    pub frame_duration: u32,
}

impl Default for NegotiatedParams {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            sample_rate: DEFAULT_SERVER_SAMPLE_RATE,
            frame_duration: DEFAULT_SERVER_FRAME_DURATION_MS,
        }
    }
}

impl NegotiatedParams {
    /// Merge a validated server hello. Absent fields keep their value.
    pub fn apply(&mut self, hello: &ServerHello) {
        if let Some(id) = &hello.session_id {
            self.session_id = id.clone();
        }
        if let Some(rate) = hello.sample_rate {
            self.sample_rate = rate;
        }
        if let Some(duration) = hello.frame_duration {
            self.frame_duration = duration;
        }
    }
}
