//! Observer registration
//!
//! Each event has a single replaceable slot. Unset slots are no-ops.
//! Handlers run on the task that produced the event, so they should not block.

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use voxlink_core::AudioStreamPacket;

pub type JsonHandler = Arc<dyn Fn(&Value) + Send + Sync>;
pub type AudioHandler = Arc<dyn Fn(AudioStreamPacket) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;
pub type SignalHandler = Arc<dyn Fn() + Send + Sync>;

/// Observer slots of a protocol instance
#[derive(Default)]
pub struct EventHandlers {
    incoming_json: RwLock<Option<JsonHandler>>,
    incoming_audio: RwLock<Option<AudioHandler>>,
    channel_opened: RwLock<Option<SignalHandler>>,
    channel_closed: RwLock<Option<SignalHandler>>,
    network_error: RwLock<Option<ErrorHandler>>,
    connected: RwLock<Option<SignalHandler>>,
    disconnected: RwLock<Option<SignalHandler>>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inbound JSON other than the server hello
    pub fn on_incoming_json<F>(&self, f: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        *self.incoming_json.write() = Some(Arc::new(f));
    }

    /// Decoded inbound audio
    pub fn on_incoming_audio<F>(&self, f: F)
    where
        F: Fn(AudioStreamPacket) + Send + Sync + 'static,
    {
        *self.incoming_audio.write() = Some(Arc::new(f));
    }

    pub fn on_audio_channel_opened<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.channel_opened.write() = Some(Arc::new(f));
    }

    pub fn on_audio_channel_closed<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.channel_closed.write() = Some(Arc::new(f));
    }

    /// Receives a human-readable message
    pub fn on_network_error<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.network_error.write() = Some(Arc::new(f));
    }

    pub fn on_connected<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.connected.write() = Some(Arc::new(f));
    }

    pub fn on_disconnected<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.disconnected.write() = Some(Arc::new(f));
    }

    /// Remove every handler
    pub fn clear(&self) {
        *self.incoming_json.write() = None;
        *self.incoming_audio.write() = None;
        *self.channel_opened.write() = None;
        *self.channel_closed.write() = None;
        *self.network_error.write() = None;
        *self.connected.write() = None;
        *self.disconnected.write() = None;
    }

    // Handlers are cloned out of their slot before the call so a handler
    // may replace itself without deadlocking.

    pub(crate) fn emit_incoming_json(&self, value: &Value) {
        let handler = self.incoming_json.read().clone();
        if let Some(handler) = handler {
            handler(value);
        }
    }

    pub(crate) fn emit_incoming_audio(&self, packet: AudioStreamPacket) {
        let handler = self.incoming_audio.read().clone();
        if let Some(handler) = handler {
            handler(packet);
        }
    }

    pub(crate) fn emit_audio_channel_opened(&self) {
        emit_signal(&self.channel_opened);
    }

    pub(crate) fn emit_audio_channel_closed(&self) {
        emit_signal(&self.channel_closed);
    }

    pub(crate) fn emit_network_error(&self, message: &str) {
        let handler = self.network_error.read().clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }

    pub(crate) fn emit_connected(&self) {
        emit_signal(&self.connected);
    }

    pub(crate) fn emit_disconnected(&self) {
        emit_signal(&self.disconnected);
    }
}

fn emit_signal(slot: &RwLock<Option<SignalHandler>>) {
    let handler = slot.read().clone();
    if let Some(handler) = handler {
        handler();
    }
}
