//! Error types for the wire codec

use thiserror::Error;

use crate::PacketType;

/// Errors that can occur while encoding or decoding HDHomeRun frames
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Fewer bytes than the fixed header and trailing CRC
    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    /// Header length field disagrees with the bytes received
    #[error("Frame length mismatch: header declares {declared} payload bytes, frame holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Trailing CRC does not match the frame contents
    #[error("CRC mismatch: frame carries {received:#010x}, computed {computed:#010x}")]
    CrcMismatch { received: u32, computed: u32 },

    /// Packet type not part of the control protocol
    #[error("Unknown packet type: {0:#06x}")]
    UnknownPacketType(u16),

    /// A reply of the wrong kind was received
    #[error("Unexpected packet type: expected {expected:?}, got {actual:?}")]
    UnexpectedPacketType {
        expected: PacketType,
        actual: PacketType,
    },

    /// Tag header or value runs past the end of the payload
    #[error("Truncated tag {tag:#04x} at offset {offset}")]
    TruncatedTag { tag: u8, offset: usize },

    /// Tag value does not fit the 15-bit length encoding
    #[error("Tag value too long: {0} bytes")]
    ValueTooLong(usize),

    /// Payload does not fit the 16-bit length field
    #[error("Payload too long: {0} bytes")]
    PayloadTooLong(usize),

    /// A tag required by the message kind is absent
    #[error("Missing tag {0:#04x}")]
    MissingTag(u8),
}

/// Convenience Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
