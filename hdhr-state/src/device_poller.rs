//! Whole-registry polling
//!
//! One task that refreshes every registered device and every tuner each
//! cycle and publishes the result as a single [`DeviceMapSnapshot`].

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use hdhr_api::{Device, DeviceId, DeviceTransport, Features, TunerState};
use serde::Serialize;
use state_store::Publisher;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::registry::DeviceRegistry;

/// Published view of one device
///
/// Detail fields are `None` when the device did not answer this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub ip: Ipv4Addr,
    pub model: Option<String>,
    pub version: Option<String>,
    pub copyright: Option<String>,
    pub features: Option<Features>,
    pub tuners: Vec<TunerSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunerSnapshot {
    pub index: u8,
    pub state: TunerState,
}

pub type DeviceMapSnapshot = BTreeMap<DeviceId, DeviceSnapshot>;

/// Polls every device in a registry on a fixed interval
pub struct DeviceMapPoller {
    registry: Arc<DeviceRegistry>,
    interval: Duration,
}

impl DeviceMapPoller {
    pub fn new(registry: Arc<DeviceRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Poll all devices once
    ///
    /// Devices are polled concurrently, and so are the tuners of each
    /// device. Failures never abort the cycle.
    pub async fn poll_once(&self) -> DeviceMapSnapshot {
        let devices = self.registry.devices();
        let transport = self.registry.transport();

        let snapshots = join_all(
            devices
                .iter()
                .map(|device| poll_device(transport.as_ref(), device)),
        )
        .await;

        snapshots
            .into_iter()
            .map(|snapshot| (snapshot.id.clone(), snapshot))
            .collect()
    }

    /// Poll until `token` is cancelled
    ///
    /// A cycle identical to the last published map wakes no subscribers.
    pub async fn run(self, publisher: Publisher<DeviceMapSnapshot>, token: CancellationToken) {
        tracing::debug!(interval = ?self.interval, "Device map poller started");

        loop {
            if token.is_cancelled() {
                break;
            }

            let snapshot = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                snapshot = self.poll_once() => snapshot,
            };

            if token.is_cancelled() {
                break;
            }
            if !publisher.publish_if_changed(snapshot) {
                tracing::trace!("Device map unchanged");
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::debug!("Device map poller stopped");
    }

    pub fn spawn(
        self,
        publisher: Publisher<DeviceMapSnapshot>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(publisher, token))
    }
}

async fn poll_device(transport: &dyn DeviceTransport, device: &Device) -> DeviceSnapshot {
    let details = async {
        match transport.get_device_details(device).await {
            Ok(details) => Some(details),
            Err(e) => {
                tracing::warn!(device_id = %device.id, ip = %device.ip, error = %e, "Device details unavailable");
                None
            }
        }
    };

    let tuners = join_all(device.tuners.iter().map(|tuner| async move {
        let state = match transport.get_tuner_state(tuner).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(tuner = %tuner, error = %e, "Tuner state unavailable, publishing no signal");
                TunerState::no_signal()
            }
        };
        TunerSnapshot {
            index: tuner.index,
            state,
        }
    }));

    let (details, tuners) = tokio::join!(details, tuners);

    DeviceSnapshot {
        id: device.id.clone(),
        ip: device.ip,
        model: details.as_ref().map(|d| d.model.clone()),
        version: details.as_ref().map(|d| d.version.clone()),
        copyright: details
            .as_ref()
            .map(|d| d.copyright.clone())
            .filter(|c| !c.is_empty()),
        features: details.map(|d| d.features),
        tuners,
    }
}
