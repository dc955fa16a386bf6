//! Device identity as reported by discover replies.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Hardware identifier of a device, rendered as 8 uppercase hex digits
///
/// Ordering and equality follow the string form, which for a fixed width
/// matches numeric order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn from_u32(raw: u32) -> Self {
        Self(format!("{:08X}", raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value, as carried in the DEVICE_ID tag
    pub fn as_u32(&self) -> u32 {
        // Construction guarantees 8 hex digits.
        u32::from_str_radix(&self.0, 16).unwrap_or_default()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when a string is not a valid device id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid device id: {0:?}")]
pub struct InvalidDeviceId(pub String);

impl FromStr for DeviceId {
    type Err = InvalidDeviceId;

    /// Accepts 1 to 8 hex digits in either case, with an optional `0x` prefix
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if digits.is_empty() || digits.len() > 8 {
            return Err(InvalidDeviceId(s.to_string()));
        }

        u32::from_str_radix(digits, 16)
            .map(Self::from_u32)
            .map_err(|_| InvalidDeviceId(s.to_string()))
    }
}

/// A tuner device that answered a discover request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    pub id: DeviceId,
    pub ip: Ipv4Addr,
    /// Reported by newer firmware; older devices are counted from tuner status replies
    pub tuner_count: Option<u8>,
    pub base_url: Option<String>,
    pub lineup_url: Option<String>,
}
