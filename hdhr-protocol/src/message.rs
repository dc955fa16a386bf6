//! Typed views over discover and get/set packets

use crate::error::{ProtocolError, Result};
use crate::packet::{tag, Packet, PacketType};

/// Device type advertised by tuner devices
pub const DEVICE_TYPE_TUNER: u32 = 0x0000_0001;

/// Wildcard matching any device id
pub const DEVICE_ID_WILDCARD: u32 = 0xFFFF_FFFF;

/// Build a discover request for tuner devices with any id
pub fn discover_request() -> Packet {
    Packet::new(PacketType::DiscoverRequest)
        .with_u32(tag::DEVICE_TYPE, DEVICE_TYPE_TUNER)
        .with_u32(tag::DEVICE_ID, DEVICE_ID_WILDCARD)
}

/// Build a get request (`value == None`) or a set request for a variable
pub fn getset_request(name: &str, value: Option<&str>) -> Packet {
    let packet = Packet::new(PacketType::GetSetRequest).with_string(tag::GETSET_NAME, name);
    match value {
        Some(value) => packet.with_string(tag::GETSET_VALUE, value),
        None => packet,
    }
}

/// Contents of a discover reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverReply {
    pub device_type: u32,
    pub device_id: u32,
    /// Present on firmware that reports it
    pub tuner_count: Option<u8>,
    pub base_url: Option<String>,
    pub lineup_url: Option<String>,
}

impl DiscoverReply {
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        expect_type(packet, PacketType::DiscoverReply)?;

        let device_type = packet
            .get_u32(tag::DEVICE_TYPE)
            .ok_or(ProtocolError::MissingTag(tag::DEVICE_TYPE))?;
        let device_id = packet
            .get_u32(tag::DEVICE_ID)
            .ok_or(ProtocolError::MissingTag(tag::DEVICE_ID))?;

        Ok(Self {
            device_type,
            device_id,
            tuner_count: packet.get_u8(tag::TUNER_COUNT),
            base_url: packet.get_string(tag::BASE_URL),
            lineup_url: packet.get_string(tag::LINEUP_URL),
        })
    }

    /// Encode as a reply frame (used by test devices)
    pub fn to_packet(&self) -> Packet {
        let mut packet = Packet::new(PacketType::DiscoverReply)
            .with_u32(tag::DEVICE_TYPE, self.device_type)
            .with_u32(tag::DEVICE_ID, self.device_id);
        if let Some(count) = self.tuner_count {
            packet = packet.with_tag(tag::TUNER_COUNT, vec![count]);
        }
        if let Some(url) = &self.base_url {
            packet = packet.with_string(tag::BASE_URL, url);
        }
        if let Some(url) = &self.lineup_url {
            packet = packet.with_string(tag::LINEUP_URL, url);
        }
        packet
    }
}

/// Contents of a get/set reply
///
/// A device answers either with the variable's value or with an error
/// message (unknown variable, rejected value, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetSetReply {
    pub name: String,
    pub outcome: std::result::Result<String, String>,
}

impl GetSetReply {
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        expect_type(packet, PacketType::GetSetReply)?;

        let name = packet.get_string(tag::GETSET_NAME).unwrap_or_default();

        if let Some(error) = packet.get_string(tag::GETSET_ERROR) {
            return Ok(Self {
                name,
                outcome: Err(error),
            });
        }

        let value = packet
            .get_string(tag::GETSET_VALUE)
            .ok_or(ProtocolError::MissingTag(tag::GETSET_VALUE))?;

        Ok(Self {
            name,
            outcome: Ok(value),
        })
    }

    /// Encode as a reply frame (used by test devices)
    pub fn to_packet(&self) -> Packet {
        let packet = Packet::new(PacketType::GetSetReply).with_string(tag::GETSET_NAME, &self.name);
        match &self.outcome {
            Ok(value) => packet.with_string(tag::GETSET_VALUE, value),
            Err(error) => packet.with_string(tag::GETSET_ERROR, error),
        }
    }
}

fn expect_type(packet: &Packet, expected: PacketType) -> Result<()> {
    if packet.packet_type == expected {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedPacketType {
            expected,
            actual: packet.packet_type,
        })
    }
}
