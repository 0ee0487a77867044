//! Voxlink Core
//!
//! Core types, encoding, and protocol primitives for the Voxlink
//! voice-assistant protocol.
//!
//! This crate provides:
//! - Decoded audio units ([`AudioStreamPacket`])
//! - Binary audio framing for wire versions 1, 2 and 3 ([`frame`])
//! - Outbound JSON control messages ([`ControlMessage`])
//! - Client/server hello negotiation ([`handshake`])
//! - Endpoint address and authorization policy ([`address`])
//!
//! Nothing in here performs I/O; the transport and the connection
//! lifecycle live in `voxlink-transport` and `voxlink-client`.

pub mod address;
pub mod control;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod packet;

pub use address::{authorization_value, normalize_endpoint};
pub use control::{AbortReason, ControlMessage, ListeningMode};
pub use error::{Error, Result};
pub use frame::{decode_frame, encode_frame, FrameHeader, FrameView, WireVersion};
pub use handshake::{AudioParams, ClientFeatures, ClientHello, NegotiatedParams, ServerHello};
pub use packet::AudioStreamPacket;

/// Transport name exchanged in the hello messages
pub const TRANSPORT_NAME: &str = "websocket";

/// Secure endpoint scheme
pub const SECURE_SCHEME: &str = "wss://";

/// Insecure endpoint scheme, upgraded to [`SECURE_SCHEME`]
pub const INSECURE_SCHEME: &str = "ws://";

/// Audio codec announced in the client hello
pub const AUDIO_FORMAT: &str = "opus";

/// Sample rate announced in the client hello (Hz)
pub const CLIENT_SAMPLE_RATE: u32 = 16000;

/// Channel count announced in the client hello
pub const CLIENT_CHANNELS: u32 = 1;

/// Opus frame duration announced in the client hello (ms)
pub const DEFAULT_FRAME_DURATION_MS: u32 = 60;

/// Server sample rate assumed until the server hello says otherwise (Hz)
pub const DEFAULT_SERVER_SAMPLE_RATE: u32 = 24000;

/// Server frame duration assumed until the server hello says otherwise (ms)
pub const DEFAULT_SERVER_FRAME_DURATION_MS: u32 = 60;

/// Accepted range for a negotiated sample rate (Hz)
pub const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 8000..=48000;

/// Accepted range for a negotiated frame duration (ms)
pub const FRAME_DURATION_RANGE: std::ops::RangeInclusive<u32> = 10..=120;
