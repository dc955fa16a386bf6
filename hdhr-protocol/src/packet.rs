//! Frame and tag encoding
//!
//! Every message on the wire is a single frame:
//!
//! ```text
//! +-----------+-------------+-----------------+-------------+
//! | type u16  | length u16  | payload (TLVs)  | crc32 (LE)  |
//! | big-end.  | big-end.    | `length` bytes  | 4 bytes     |
//! +-----------+-------------+-----------------+-------------+
//! ```
//!
//! The payload is a sequence of `tag | varlen | value` records. Lengths below
//! 128 take one byte; longer values use two bytes, low seven bits first with
//! the high bit of the first byte set.

use bytes::{BufMut, Bytes, BytesMut};

use crate::crc::crc32;
use crate::error::{ProtocolError, Result};

/// Size of the fixed frame header (type + length).
pub const HEADER_LEN: usize = 4;

/// Size of the trailing CRC.
pub const CRC_LEN: usize = 4;

/// Largest value a single tag can carry.
pub const MAX_TAG_VALUE_LEN: usize = 0x7FFF;

/// Packet types of the control protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    DiscoverRequest,
    DiscoverReply,
    GetSetRequest,
    GetSetReply,
}

impl PacketType {
    /// Numeric value carried in the frame header
    pub fn code(self) -> u16 {
        match self {
            PacketType::DiscoverRequest => 0x0002,
            PacketType::DiscoverReply => 0x0003,
            PacketType::GetSetRequest => 0x0004,
            PacketType::GetSetReply => 0x0005,
        }
    }
}

impl TryFrom<u16> for PacketType {
    type Error = ProtocolError;

    fn try_from(code: u16) -> Result<Self> {
        match code {
            0x0002 => Ok(PacketType::DiscoverRequest),
            0x0003 => Ok(PacketType::DiscoverReply),
            0x0004 => Ok(PacketType::GetSetRequest),
            0x0005 => Ok(PacketType::GetSetReply),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

/// Tag identifiers used in payloads
pub mod tag {
    pub const DEVICE_TYPE: u8 = 0x01;
    pub const DEVICE_ID: u8 = 0x02;
    pub const GETSET_NAME: u8 = 0x03;
    pub const GETSET_VALUE: u8 = 0x04;
    pub const GETSET_ERROR: u8 = 0x05;
    pub const TUNER_COUNT: u8 = 0x10;
    pub const LINEUP_URL: u8 = 0x27;
    pub const BASE_URL: u8 = 0x2A;
}

/// A single tag/value record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tag: u8,
    pub value: Bytes,
}

/// A decoded (or to-be-encoded) frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub tags: Vec<Tlv>,
}

impl Packet {
    /// Create an empty packet of the given type
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            tags: Vec::new(),
        }
    }

    /// Append a raw tag value
    pub fn with_tag(mut self, tag: u8, value: impl Into<Bytes>) -> Self {
        self.tags.push(Tlv {
            tag,
            value: value.into(),
        });
        self
    }

    /// Append a big-endian u32 tag value
    pub fn with_u32(self, tag: u8, value: u32) -> Self {
        self.with_tag(tag, Bytes::copy_from_slice(&value.to_be_bytes()))
    }

    /// Append a NUL-terminated string tag value
    pub fn with_string(self, tag: u8, value: &str) -> Self {
        let mut buf = BytesMut::with_capacity(value.len() + 1);
        buf.put_slice(value.as_bytes());
        buf.put_u8(0);
        self.with_tag(tag, buf.freeze())
    }

    /// First value carried for `tag`
    pub fn get(&self, tag: u8) -> Option<&Bytes> {
        self.tags.iter().find(|t| t.tag == tag).map(|t| &t.value)
    }

    /// Big-endian u32 value for `tag`, if exactly four bytes are present
    pub fn get_u32(&self, tag: u8) -> Option<u32> {
        let value = self.get(tag)?;
        let bytes: [u8; 4] = value.as_ref().try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    /// Single-byte value for `tag`
    pub fn get_u8(&self, tag: u8) -> Option<u8> {
        match self.get(tag)?.as_ref() {
            [byte] => Some(*byte),
            _ => None,
        }
    }

    /// String value for `tag` with trailing NULs removed
    pub fn get_string(&self, tag: u8) -> Option<String> {
        let value = self.get(tag)?;
        let end = value
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(value.len());
        Some(String::from_utf8_lossy(&value[..end]).into_owned())
    }

    /// Serialize into a sealed frame
    pub fn encode(&self) -> Result<Bytes> {
        let mut payload = BytesMut::new();
        for tlv in &self.tags {
            let len = tlv.value.len();
            if len > MAX_TAG_VALUE_LEN {
                return Err(ProtocolError::ValueTooLong(len));
            }
            payload.put_u8(tlv.tag);
            if len < 0x80 {
                payload.put_u8(len as u8);
            } else {
                payload.put_u8(0x80 | (len & 0x7F) as u8);
                payload.put_u8((len >> 7) as u8);
            }
            payload.put_slice(&tlv.value);
        }

        if payload.len() > u16::MAX as usize {
            return Err(ProtocolError::PayloadTooLong(payload.len()));
        }

        let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
        frame.put_u16(self.packet_type.code());
        frame.put_u16(payload.len() as u16);
        frame.put_slice(&payload);
        let crc = crc32(&frame);
        frame.put_u32_le(crc);
        Ok(frame.freeze())
    }

    /// Parse and verify a complete frame
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < HEADER_LEN + CRC_LEN {
            return Err(ProtocolError::FrameTooShort(frame.len()));
        }

        let code = u16::from_be_bytes([frame[0], frame[1]]);
        let declared = u16::from_be_bytes([frame[2], frame[3]]) as usize;
        let actual = frame.len() - HEADER_LEN - CRC_LEN;
        if declared != actual {
            return Err(ProtocolError::LengthMismatch { declared, actual });
        }

        let body_end = HEADER_LEN + declared;
        let received = u32::from_le_bytes([
            frame[body_end],
            frame[body_end + 1],
            frame[body_end + 2],
            frame[body_end + 3],
        ]);
        let computed = crc32(&frame[..body_end]);
        if received != computed {
            return Err(ProtocolError::CrcMismatch { received, computed });
        }

        let packet_type = PacketType::try_from(code)?;
        let tags = decode_tags(&frame[HEADER_LEN..body_end])?;
        Ok(Self { packet_type, tags })
    }
}

/// Total frame size announced by a header, once at least four bytes are buffered
///
/// Used by stream readers to know how many bytes make up the next frame.
pub fn frame_len(header: &[u8]) -> Option<usize> {
    if header.len() < HEADER_LEN {
        return None;
    }
    let declared = u16::from_be_bytes([header[2], header[3]]) as usize;
    Some(HEADER_LEN + declared + CRC_LEN)
}

fn decode_tags(payload: &[u8]) -> Result<Vec<Tlv>> {
    let mut tags = Vec::new();
    let mut pos = 0;

    while pos < payload.len() {
        let offset = pos;
        let tag = payload[pos];
        pos += 1;

        let first = *payload
            .get(pos)
            .ok_or(ProtocolError::TruncatedTag { tag, offset })?;
        pos += 1;

        let len = if first & 0x80 != 0 {
            let second = *payload
                .get(pos)
                .ok_or(ProtocolError::TruncatedTag { tag, offset })?;
            pos += 1;
            (first & 0x7F) as usize | ((second as usize) << 7)
        } else {
            first as usize
        };

        let end = pos + len;
        if end > payload.len() {
            return Err(ProtocolError::TruncatedTag { tag, offset });
        }

        tags.push(Tlv {
            tag,
            value: Bytes::copy_from_slice(&payload[pos..end]),
        });
        pos = end;
    }

    Ok(tags)
}
