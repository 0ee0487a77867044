//! Voxlink Client Library
//!
//! Async client for the Voxlink voice protocol: connects to the server,
//! performs the hello exchange and then carries audio frames and JSON
//! control messages over one channel.
//!
//! # Example
//!
//! ```ignore
//! use voxlink_client::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let protocol = WebsocketProtocol::builder("wss://api.example.com/voice/")
//!         .token("my-token")
//!         .device_id("aa:bb:cc:dd:ee:ff")
//!         .build()?;
//!
//!     protocol.events().on_incoming_json(|msg| println!("{}", msg));
//!     protocol.events().on_incoming_audio(|packet| println!("{} bytes", packet.payload.len()));
//!
//!     protocol.open_audio_channel().await?;
//!     protocol.send_start_listening(ListeningMode::AutoStop).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod events;
pub mod protocol;
pub mod session;
pub mod websocket;

pub use builder::VoxlinkBuilder;
pub use config::{MemorySettings, ProtocolConfig, SettingsStore, SETTINGS_NAMESPACE};
pub use cooldown::ReconnectCooldown;
pub use error::{ClientError, NetworkErrorKind, Result};
pub use events::EventHandlers;
pub use protocol::Protocol;
pub use session::ProtocolSession;
pub use websocket::{ConnectionState, WebsocketProtocol};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::VoxlinkBuilder;
    pub use crate::error::{ClientError, Result};
    pub use crate::protocol::Protocol;
    pub use crate::websocket::WebsocketProtocol;
    pub use voxlink_core::{AbortReason, AudioStreamPacket, ListeningMode};
}
