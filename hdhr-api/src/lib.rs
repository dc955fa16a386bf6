//! Typed control API for HDHomeRun tuner devices
//!
//! This crate sits on top of the wire codec and discovery crates and exposes
//! the device operations a monitor needs: discovery, `/sys/*` details, and
//! per-tuner channel, stream info, status and lineup queries plus channel
//! changes.
//!
//! [`DeviceTransport`] is the seam consumers program against; [`HdhrClient`]
//! is the TCP implementation.
//!
//! # Example
//!
//! ```no_run
//! use hdhr_api::{DeviceTransport, HdhrClient};
//!
//! # async fn run() -> hdhr_api::Result<()> {
//! let client = HdhrClient::new();
//! for device in client.discover("192.168.1.255".parse().unwrap()).await? {
//!     for tuner in &device.tuners {
//!         let status = client.get_status(tuner).await?;
//!         println!("{}: ss={} snq={}", tuner, status.ss, status.snq);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
pub mod parse;
pub mod transport;

pub use client::{ClientConfig, HdhrClient};
pub use error::{ApiError, Result};
pub use models::{
    lineup_display, Channel, Device, DeviceChannel, DeviceDetails, DeviceFrequency, DeviceMap,
    Features, Lineup, Tuner, TunerState, TunerStatus,
};
pub use transport::DeviceTransport;

pub use hdhr_discovery::DeviceId;
pub use hdhr_protocol::CONTROL_PORT;
