//! Device, tuner and snapshot types shared by the transport and its consumers.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use hdhr_discovery::{DeviceId, DiscoveredDevice};
use serde::Serialize;

/// A tuner device on the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: DeviceId,
    pub ip: Ipv4Addr,
    pub tuners: Vec<Tuner>,
    pub details: Option<DeviceDetails>,
}

impl Device {
    /// A device with no tuners and no details yet
    pub fn new(id: DeviceId, ip: Ipv4Addr) -> Self {
        Self {
            id,
            ip,
            tuners: Vec::new(),
            details: None,
        }
    }

    /// Build tuners `0..count` belonging to this device
    pub fn with_tuner_count(mut self, count: u8) -> Self {
        self.tuners = (0..count).map(|index| Tuner::new(&self, index)).collect();
        self
    }

    pub fn tuner(&self, index: u8) -> Option<&Tuner> {
        self.tuners.iter().find(|t| t.index == index)
    }
}

impl From<DiscoveredDevice> for Device {
    fn from(discovered: DiscoveredDevice) -> Self {
        let device = Device::new(discovered.id, discovered.ip);
        match discovered.tuner_count {
            Some(count) => device.with_tuner_count(count),
            None => device,
        }
    }
}

/// Identity and capabilities reported by `/sys/*`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDetails {
    pub model: String,
    pub version: String,
    pub copyright: String,
    pub features: Features,
    pub tuner_count: u8,
}

/// A single tuner on a device
///
/// Holds the owning device's id and address for lookup only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Tuner {
    pub device_id: DeviceId,
    pub ip: Ipv4Addr,
    pub index: u8,
}

impl Tuner {
    pub fn new(device: &Device, index: u8) -> Self {
        Self {
            device_id: device.id.clone(),
            ip: device.ip,
            index,
        }
    }

    /// Full name of a per-tuner variable, e.g. `/tuner1/status`
    pub fn variable(&self, leaf: &str) -> String {
        format!("/tuner{}/{}", self.index, leaf)
    }
}

impl std::fmt::Display for Tuner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.device_id, self.index)
    }
}

/// Capabilities listed by `/sys/features`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Features {
    pub channel_maps: Vec<String>,
    pub modulations: Vec<String>,
    pub auto_modulations: Vec<String>,
}

impl Features {
    pub fn supports_auto_modulation(&self) -> bool {
        !self.auto_modulations.is_empty()
    }
}

/// Guide entry for one program of the active stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    /// Virtual channel, e.g. `13.1`
    pub program: String,
    pub callsign: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceFrequency {
    pub guide_number: String,
    pub guide_name: String,
}

/// Lineup entry for one channel number
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceChannel {
    pub frequency: Option<DeviceFrequency>,
}

impl DeviceChannel {
    /// Text shown for this entry, `(no signal)` when nothing is mapped
    pub fn display_name(&self) -> String {
        match &self.frequency {
            Some(f) => format!("{} {}", f.guide_number, f.guide_name),
            None => NO_SIGNAL.to_string(),
        }
    }
}

const NO_SIGNAL: &str = "(no signal)";

/// Channel number to lineup entry, ordered by channel number
pub type Lineup = BTreeMap<u32, Option<DeviceChannel>>;

/// Display text for a lineup slot, including unmapped ones
pub fn lineup_display(entry: Option<&DeviceChannel>) -> String {
    entry.map(DeviceChannel::display_name).unwrap_or_else(|| NO_SIGNAL.to_string())
}

/// Parsed `/tunerN/status` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunerStatus {
    pub channel: String,
    pub lock: String,
    /// Signal strength, 0-100
    pub ss: u8,
    /// Signal-to-noise quality, 0-100
    pub snq: u8,
    /// Symbol error quality, 0-100
    pub seq: u8,
    pub bps: u64,
    pub pps: u64,
}

impl Default for TunerStatus {
    fn default() -> Self {
        Self {
            channel: "none".to_string(),
            lock: "none".to_string(),
            ss: 0,
            snq: 0,
            seq: 0,
            bps: 0,
            pps: 0,
        }
    }
}

impl TunerStatus {
    pub fn is_locked(&self) -> bool {
        self.lock != "none"
    }
}

/// Everything published about one tuner after a poll cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunerState {
    /// Guide entry of the first program in the active stream
    pub channel_info: Option<Channel>,
    pub channel_number: Option<u32>,
    pub status: TunerStatus,
    pub lineup: Lineup,
    /// All programs of the active stream, by program id
    pub programs: BTreeMap<u16, Channel>,
}

impl TunerState {
    /// Assemble a snapshot from the four per-cycle queries
    pub fn assemble(
        programs: BTreeMap<u16, Channel>,
        channel_number: Option<u32>,
        status: TunerStatus,
        lineup: Lineup,
    ) -> Self {
        Self {
            channel_info: programs.values().next().cloned(),
            channel_number,
            status,
            lineup,
            programs,
        }
    }

    /// Substitution value for a cycle that failed
    pub fn no_signal() -> Self {
        Self {
            channel_info: None,
            channel_number: None,
            status: TunerStatus::default(),
            lineup: Lineup::new(),
            programs: BTreeMap::new(),
        }
    }

    pub fn is_no_signal(&self) -> bool {
        *self == Self::no_signal()
    }
}

/// Devices keyed by id
pub type DeviceMap = BTreeMap<DeviceId, Device>;
