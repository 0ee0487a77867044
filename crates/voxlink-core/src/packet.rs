//! Decoded audio unit exchanged with the application

use bytes::Bytes;

/// One encoded audio frame plus the stream parameters it belongs to.
///
/// Ownership moves on every hop: the codec hands a decoded packet to the
/// audio observer, and `send_audio` consumes the packet it is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStreamPacket {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Frame duration in milliseconds
    pub frame_duration: u32,
    /// Sender timestamp (only carried on the wire by version 2)
    pub timestamp: u32,
    /// Encoded audio (opus)
    pub payload: Bytes,
}

impl AudioStreamPacket {
    /// Create a packet with payload and stream parameters
    pub fn new(sample_rate: u32, frame_duration: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            sample_rate,
            frame_duration,
            timestamp: 0,
            payload: payload.into(),
        }
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }
}
