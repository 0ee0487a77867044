//! Binary audio frame encoding/decoding
//!
//! Audio travels in binary transport messages. The layout depends on the
//! negotiated wire version; all multi-byte fields are big-endian.
//!
//! ```text
//! Version 1: no header
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Payload (opus)                                                  │
//! └─────────────────────────────────────────────────────────────────┘
//!
//! Version 2: 14-byte header
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Byte 0-1:   Version (uint16)                                    │
//! │ Byte 2-3:   Type (uint16, 0 = audio)                            │
//! │ Byte 4-5:   Reserved (uint16)                                   │
//! │ Byte 6-9:   Timestamp (uint32)                                  │
//! │ Byte 10-13: Payload size (uint32)                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Payload (opus)                                                  │
//! └─────────────────────────────────────────────────────────────────┘
//!
//! Version 3: 6-byte header
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Byte 0-1:   Type (uint16, 0 = audio)                            │
//! │ Byte 2-3:   Reserved (uint16)                                   │
//! │ Byte 4-5:   Payload size (uint16)                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Payload (opus)                                                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use crate::{AudioStreamPacket, Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame type for audio payloads
pub const FRAME_TYPE_AUDIO: u16 = 0;

/// Negotiated binary framing format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum WireVersion {
    /// Raw payload, no header
    #[default]
    V1 = 1,
    /// Versioned header with timestamp and 32-bit length
    V2 = 2,
    /// Compact header with 16-bit length
    V3 = 3,
}

impl WireVersion {
    pub fn from_u16(val: u16) -> Option<Self> {
        match val {
            1 => Some(WireVersion::V1),
            2 => Some(WireVersion::V2),
            3 => Some(WireVersion::V3),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Bytes preceding the payload
    pub fn header_size(self) -> usize {
        match self {
            WireVersion::V1 => 0,
            // version, type, reserved, timestamp, size: 14 bytes, not the 12
            // sometimes quoted for this layout
            WireVersion::V2 => 2 + 2 + 2 + 4 + 4,
            WireVersion::V3 => 2 + 2 + 2,
        }
    }
}

impl TryFrom<u16> for WireVersion {
    type Error = Error;

    fn try_from(val: u16) -> Result<Self> {
        WireVersion::from_u16(val).ok_or(Error::UnsupportedVersion(val))
    }
}

impl std::fmt::Display for WireVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Decoded frame header, host byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Version field (version 2 only)
    pub version: u16,
    pub frame_type: u16,
    pub reserved: u16,
    /// Timestamp (version 2 only)
    pub timestamp: u32,
    pub payload_size: u32,
}

impl FrameHeader {
    /// Read the header of `version` from exactly `header_size()` bytes
    fn read(version: WireVersion, mut buf: &[u8]) -> Self {
        match version {
            WireVersion::V1 => Self {
                version: 1,
                ..Self::default()
            },
            WireVersion::V2 => Self {
                version: buf.get_u16(),
                frame_type: buf.get_u16(),
                reserved: buf.get_u16(),
                timestamp: buf.get_u32(),
                payload_size: buf.get_u32(),
            },
            WireVersion::V3 => Self {
                version: 3,
                frame_type: buf.get_u16(),
                reserved: buf.get_u16(),
                timestamp: 0,
                payload_size: buf.get_u16() as u32,
            },
        }
    }
}

/// A received frame whose declared length has been checked against the
/// bytes actually present.
///
/// The only way to obtain one is [`FrameView::parse`], so `payload()` can
/// never reach past the end of the input.
#[derive(Debug, Clone)]
pub struct FrameView {
    header: FrameHeader,
    payload: Bytes,
}

impl FrameView {
    /// Validate and split a received frame
    pub fn parse(data: Bytes, version: WireVersion) -> Result<Self> {
        let header_size = version.header_size();
        if data.len() < header_size {
            return Err(Error::TruncatedHeader {
                needed: header_size,
                have: data.len(),
            });
        }

        let header = FrameHeader::read(version, &data[..header_size]);
        let available = data.len() - header_size;

        let declared = match version {
            WireVersion::V1 => available,
            WireVersion::V2 | WireVersion::V3 => header.payload_size as usize,
        };
        if declared > available {
            return Err(Error::PayloadOverflow {
                declared,
                available,
            });
        }

        let payload = data.slice(header_size..header_size + declared);
        let header = FrameHeader {
            payload_size: declared as u32,
            ..header
        };

        Ok(Self { header, payload })
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Encode an audio packet for the given wire version.
///
/// The output is always `version.header_size() + payload.len()` bytes.
pub fn encode_frame(packet: &AudioStreamPacket, version: WireVersion) -> Result<Bytes> {
    let len = packet.payload.len();

    match version {
        WireVersion::V1 => Ok(packet.payload.clone()),
        WireVersion::V2 => {
            let size = u32::try_from(len).map_err(|_| Error::PayloadTooLarge(len))?;
            let mut buf = BytesMut::with_capacity(version.header_size() + len);
            buf.put_u16(version.as_u16());
            buf.put_u16(FRAME_TYPE_AUDIO);
            buf.put_u16(0);
            buf.put_u32(packet.timestamp);
            buf.put_u32(size);
            buf.extend_from_slice(&packet.payload);
            Ok(buf.freeze())
        }
        WireVersion::V3 => {
            let size = u16::try_from(len).map_err(|_| Error::PayloadTooLarge(len))?;
            let mut buf = BytesMut::with_capacity(version.header_size() + len);
            buf.put_u16(FRAME_TYPE_AUDIO);
            buf.put_u16(0);
            buf.put_u16(size);
            buf.extend_from_slice(&packet.payload);
            Ok(buf.freeze())
        }
    }
}

/// Decode a received binary frame into an audio packet.
///
/// Sample rate and frame duration are not carried on the wire; the caller
/// passes the currently negotiated values.
pub fn decode_frame(
    data: Bytes,
    version: WireVersion,
    sample_rate: u32,
    frame_duration: u32,
) -> Result<AudioStreamPacket> {
    let view = FrameView::parse(data, version)?;
    let timestamp = match version {
        WireVersion::V2 => view.header().timestamp,
        WireVersion::V1 | WireVersion::V3 => 0,
    };

    Ok(AudioStreamPacket {
        sample_rate,
        frame_duration,
        timestamp,
        payload: view.into_payload(),
    })
}
