//! HDHomeRun control protocol codec
//!
//! This crate provides the sans-IO wire layer shared by discovery and the
//! control client: frame encoding with CRC sealing, tag/value payloads, and
//! typed views over discover and get/set messages.
//!
//! # Example
//!
//! ```rust
//! use hdhr_protocol::{getset_request, GetSetReply, Packet};
//!
//! let frame = getset_request("/tuner0/status", None).encode().unwrap();
//! let decoded = Packet::decode(&frame).unwrap();
//! assert!(GetSetReply::from_packet(&decoded).is_err()); // a request, not a reply
//! ```

mod crc;
mod error;
mod message;
mod packet;

pub use crc::crc32;
pub use error::{ProtocolError, Result};
pub use message::{
    discover_request, getset_request, DiscoverReply, GetSetReply, DEVICE_ID_WILDCARD,
    DEVICE_TYPE_TUNER,
};
pub use packet::{frame_len, tag, Packet, PacketType, Tlv, CRC_LEN, HEADER_LEN, MAX_TAG_VALUE_LEN};

/// UDP discovery and TCP control port
pub const CONTROL_PORT: u16 = 65001;
