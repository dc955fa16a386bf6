use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Channel, Device, DeviceDetails, Lineup, Tuner, TunerState, TunerStatus};

/// Request/reply access to tuner devices
///
/// Implementations bound every call by a timeout. Dropping a returned
/// future abandons the request and releases its connection, which is how
/// pollers cancel in-flight work.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Broadcast a discover request and collect the devices that answer
    async fn discover(&self, broadcast: Ipv4Addr) -> Result<Vec<Device>>;

    /// Unicast discover a device at a known address
    async fn add_device(&self, ip: Ipv4Addr) -> Result<Device>;

    /// Query model, version, features and copyright, and settle the tuner count
    async fn get_device_details(&self, device: &Device) -> Result<DeviceDetails>;

    /// Current channel number, `None` when the tuner is idle
    async fn get_channel(&self, tuner: &Tuner) -> Result<Option<u32>>;

    /// Programs of the active stream, empty without signal
    async fn get_stream_info(&self, tuner: &Tuner) -> Result<BTreeMap<u16, Channel>>;

    async fn get_status(&self, tuner: &Tuner) -> Result<TunerStatus>;

    async fn get_lineup(&self, tuner: &Tuner) -> Result<Lineup>;

    /// Tune to `channel`; the lineup is not consulted
    ///
    /// Any failure to get an acknowledgement is `ApiError::ChannelSet`.
    async fn set_channel(&self, tuner: &Tuner, channel: u32) -> Result<()>;

    /// The four per-cycle queries assembled into one snapshot
    ///
    /// The queries run concurrently; the first error fails the whole
    /// snapshot and abandons the remaining requests.
    async fn get_tuner_state(&self, tuner: &Tuner) -> Result<TunerState> {
        let (programs, channel, status, lineup) = tokio::try_join!(
            self.get_stream_info(tuner),
            self.get_channel(tuner),
            self.get_status(tuner),
            self.get_lineup(tuner),
        )?;
        Ok(TunerState::assemble(programs, channel, status, lineup))
    }
}
