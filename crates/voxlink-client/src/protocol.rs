//! Protocol facade
//!
//! [`Protocol`] is what the application layer talks to. Transport-specific
//! implementations provide the channel primitives; the control intents are
//! built on top of `send_text`.

use async_trait::async_trait;
use tracing::debug;
use voxlink_core::{AbortReason, AudioStreamPacket, ControlMessage, ListeningMode};

use crate::error::Result;
use crate::events::EventHandlers;

#[async_trait]
pub trait Protocol: Send + Sync {
    /// Prepare the protocol. Does not connect.
    async fn start(&self) -> Result<()>;

    /// Connect, perform the hello exchange and open the audio channel
    async fn open_audio_channel(&self) -> Result<()>;

    /// Release the connection. Safe to call at any time.
    async fn close_audio_channel(&self);

    /// Connected, no error flagged and not timed out
    fn is_audio_channel_opened(&self) -> bool;

    async fn send_audio(&self, packet: AudioStreamPacket) -> Result<()>;

    async fn send_text(&self, text: &str) -> Result<()>;

    /// Session id assigned by the server, empty before the first hello
    fn session_id(&self) -> String;

    fn server_sample_rate(&self) -> u32;

    fn server_frame_duration(&self) -> u32;

    /// No inbound traffic for longer than the channel timeout
    fn is_timeout(&self) -> bool;

    /// Flag an error and notify the network error observer
    fn set_error(&self, message: &str);

    fn events(&self) -> &EventHandlers;

    async fn send_control(&self, message: &ControlMessage) -> Result<()> {
        let text = message.to_json()?;
        debug!("Sending control message ({} bytes)", text.len());
        self.send_text(&text).await
    }

    async fn send_abort_speaking(&self, reason: AbortReason) -> Result<()> {
        let message = ControlMessage::abort(&self.session_id(), reason);
        self.send_control(&message).await
    }

    async fn send_wake_word_detected(&self, wake_word: &str) -> Result<()> {
        let message = ControlMessage::wake_word_detected(&self.session_id(), wake_word);
        self.send_control(&message).await
    }

    async fn send_start_listening(&self, mode: ListeningMode) -> Result<()> {
        let message = ControlMessage::start_listening(&self.session_id(), mode);
        self.send_control(&message).await
    }

    async fn send_stop_listening(&self) -> Result<()> {
        let message = ControlMessage::stop_listening(&self.session_id());
        self.send_control(&message).await
    }

    async fn send_mcp_message(&self, payload: &str) -> Result<()> {
        let message = ControlMessage::mcp(&self.session_id(), payload);
        self.send_control(&message).await
    }
}
