//! HDHomeRun device discovery library
//!
//! This crate resolves the subnet broadcast address of the active network
//! link and finds tuner devices on it with the UDP discover exchange.
//!
//! # Quick Start
//!
//! ```no_run
//! use hdhr_discovery::{get, HostLink};
//!
//! # async fn run() -> hdhr_discovery::Result<()> {
//! for device in get(&HostLink::default()).await? {
//!     println!("Found {} at {}", device.id, device.ip);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Known Addresses
//!
//! Networks that filter broadcasts can still reach devices by address:
//!
//! ```no_run
//! use hdhr_discovery::Discoverer;
//!
//! # async fn run() -> hdhr_discovery::Result<()> {
//! let device = Discoverer::new().discover_at("192.168.1.86".parse().unwrap()).await?;
//! println!("{} reports {:?} tuners", device.id, device.tuner_count);
//! # Ok(())
//! # }
//! ```

mod broadcast;
mod device;
mod discovery;
mod error;

pub use broadcast::{
    broadcast_address, broadcast_or_none, interface_prefix_len, prefix_to_mask, resolve_broadcast,
    HostLink, LinkAddress, LinkProperties, LinkProvider, StaticLink,
};
pub use device::{DeviceId, DiscoveredDevice, InvalidDeviceId};
pub use discovery::Discoverer;
pub use error::{DiscoveryError, ResolveError, Result};

use std::time::Duration;

/// Discover tuner devices on the provider's link with a default 3-second window
///
/// Returns an empty list when no broadcast address can be resolved.
pub async fn get(provider: &dyn LinkProvider) -> Result<Vec<DiscoveredDevice>> {
    get_with_timeout(provider, Duration::from_secs(3)).await
}

/// Discover tuner devices on the provider's link with a custom window
pub async fn get_with_timeout(
    provider: &dyn LinkProvider,
    window: Duration,
) -> Result<Vec<DiscoveredDevice>> {
    match broadcast_or_none(provider) {
        Some(broadcast) => Discoverer::new().with_window(window).discover(broadcast).await,
        None => Ok(Vec::new()),
    }
}
