//! Outbound JSON control messages
//!
//! Every message is tagged with the current session id. Messages are built
//! as typed values and serialized with `serde_json`, so caller-supplied
//! strings (wake words, MCP payloads) are always escaped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::Result;

/// Why the client asks the server to stop speaking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbortReason {
    #[default]
    None,
    WakeWordDetected,
}

/// How the server should decide when the user stopped talking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListeningMode {
    /// Full duplex, the server keeps listening while speaking
    #[serde(rename = "realtime")]
    Realtime,
    /// The server detects the end of speech
    #[serde(rename = "auto")]
    AutoStop,
    /// The client sends an explicit stop
    #[serde(rename = "manual")]
    Manual,
}

/// Listening state carried by `listen` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenState {
    Detect,
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortMessage {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenMessage {
    pub session_id: String,
    pub state: ListenState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ListeningMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpMessage {
    pub session_id: String,
    pub payload: Value,
}

/// A control intent sent to the server as a text message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "abort")]
    Abort(AbortMessage),
    #[serde(rename = "listen")]
    Listen(ListenMessage),
    #[serde(rename = "mcp")]
    Mcp(McpMessage),
}

impl ControlMessage {
    /// Ask the server to stop speaking
    pub fn abort(session_id: &str, reason: AbortReason) -> Self {
        ControlMessage::Abort(AbortMessage {
            session_id: session_id.to_string(),
            reason: match reason {
                AbortReason::WakeWordDetected => Some("wake_word_detected".to_string()),
                AbortReason::None => None,
            },
        })
    }

    /// Report a detected wake word
    pub fn wake_word_detected(session_id: &str, wake_word: &str) -> Self {
        ControlMessage::Listen(ListenMessage {
            session_id: session_id.to_string(),
            state: ListenState::Detect,
            mode: None,
            text: Some(wake_word.to_string()),
        })
    }

    pub fn start_listening(session_id: &str, mode: ListeningMode) -> Self {
        ControlMessage::Listen(ListenMessage {
            session_id: session_id.to_string(),
            state: ListenState::Start,
            mode: Some(mode),
            text: None,
        })
    }

    pub fn stop_listening(session_id: &str) -> Self {
        ControlMessage::Listen(ListenMessage {
            session_id: session_id.to_string(),
            state: ListenState::Stop,
            mode: None,
            text: None,
        })
    }

    /// Wrap an MCP payload.
    ///
    /// A payload that is not valid JSON is sent as a JSON string instead of
    /// being rejected.
    pub fn mcp(session_id: &str, payload: &str) -> Self {
        let payload = match serde_json::from_str::<Value>(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("MCP payload is not valid JSON ({}), sending as string", e);
                Value::String(payload.to_string())
            }
        };

        ControlMessage::Mcp(McpMessage {
            session_id: session_id.to_string(),
            payload,
        })
    }

    pub fn session_id(&self) -> &str {
        match self {
            ControlMessage::Abort(m) => &m.session_id,
            ControlMessage::Listen(m) => &m.session_id,
            ControlMessage::Mcp(m) => &m.session_id,
        }
    }

    /// Serialize to compact JSON text
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
