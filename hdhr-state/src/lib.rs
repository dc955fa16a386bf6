//! Device registry, tuner polling and monitor sessions
//!
//! This crate turns the request/reply API of `hdhr-api` into continuously
//! updated state:
//!
//! - [`DeviceRegistry`]: known devices and their tuners
//! - [`TunerPoller`]: one polling loop per tuner, publishing [`TunerState`]
//! - [`DeviceMapPoller`]: one loop publishing every device at once
//! - [`TunerMonitor`] / [`MonitorSession`]: lifecycles around the above
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hdhr_api::HdhrClient;
//! use hdhr_state::{MonitorConfig, MonitorSession};
//!
//! # async fn run() -> hdhr_state::Result<()> {
//! let config = MonitorConfig::default();
//! let transport = Arc::new(HdhrClient::with_config(config.client_config()));
//!
//! let mut session = MonitorSession::bootstrap(transport, config).await?;
//! session.start_monitors();
//!
//! for monitor in session.monitors() {
//!     let mut updates = monitor.subscribe();
//!     if let Some(state) = updates.next().await {
//!         println!("{}: ss={}", monitor.tuner(), state.status.ss);
//!     }
//! }
//!
//! session.shutdown().await
//! # }
//! ```

pub mod config;
pub mod device_poller;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod poller;
pub mod registry;

pub use config::MonitorConfig;
pub use device_poller::{DeviceMapPoller, DeviceMapSnapshot, DeviceSnapshot, TunerSnapshot};
pub use error::{Result, StateError};
pub use monitor::{MonitorSession, TunerMonitor};
pub use poller::{PollerState, PollerStats, TunerPoller};
pub use registry::DeviceRegistry;

pub use hdhr_api::{TunerState, TunerStatus};
pub use state_store::{StateReader, Subscription};
