//! Monitor lifecycles
//!
//! [`TunerMonitor`] ties one [`TunerPoller`] to the cell it publishes into.
//! [`MonitorSession`] owns the registry and one monitor per tuner, and runs
//! the bootstrap sequence.

use std::collections::BTreeMap;
use std::sync::Arc;

use hdhr_api::{ApiError, DeviceId, DeviceTransport, Tuner, TunerState};
use hdhr_discovery::broadcast_or_none;
use state_store::{Publisher, StateReader, Subscription};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::device_poller::{DeviceMapPoller, DeviceMapSnapshot};
use crate::error::{Result, StateError};
use crate::poller::{PollerState, PollerStats, TunerPoller};
use crate::registry::DeviceRegistry;

/// A running poller for one tuner plus read access to what it publishes
///
/// Dropping the monitor cancels the poller; [`stop`](TunerMonitor::stop)
/// also waits for it to finish.
pub struct TunerMonitor {
    tuner: Tuner,
    transport: Arc<dyn DeviceTransport>,
    reader: StateReader<TunerState>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
    stats: Arc<PollerStats>,
}

impl TunerMonitor {
    /// Spawn a poller for `tuner`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(transport: Arc<dyn DeviceTransport>, tuner: Tuner, config: &MonitorConfig) -> Self {
        Self::start_with_token(transport, tuner, config, CancellationToken::new())
    }

    fn start_with_token(
        transport: Arc<dyn DeviceTransport>,
        tuner: Tuner,
        config: &MonitorConfig,
        token: CancellationToken,
    ) -> Self {
        let publisher = Publisher::new();
        let reader = publisher.reader();

        let poller = TunerPoller::new(tuner.clone(), Arc::clone(&transport), config.poll_interval);
        let stats = poller.stats();
        let task = poller.spawn(publisher, token.clone());

        tracing::info!(tuner = %tuner, "Started tuner monitor");

        Self {
            tuner,
            transport,
            reader,
            token,
            task: Some(task),
            stats,
        }
    }

    pub fn tuner(&self) -> &Tuner {
        &self.tuner
    }

    /// Latest published state, `None` before the first cycle completes
    pub fn current(&self) -> Option<TunerState> {
        self.reader.current()
    }

    pub fn subscribe(&self) -> Subscription<TunerState> {
        self.reader.subscribe()
    }

    pub fn reader(&self) -> StateReader<TunerState> {
        self.reader.clone()
    }

    /// Tune to `channel`; the next poll cycle reflects the result
    pub async fn set_channel(&self, channel: u32) -> std::result::Result<(), ApiError> {
        tracing::info!(tuner = %self.tuner, channel, "Setting channel");
        self.transport.set_channel(&self.tuner, channel).await
    }

    pub fn stats(&self) -> &PollerStats {
        &self.stats
    }

    pub fn state(&self) -> PollerState {
        self.stats.state()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the poller and wait for it to exit
    ///
    /// Subscriptions end once the task has finished.
    pub async fn stop(mut self) -> Result<()> {
        self.token.cancel();
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        task.await
            .map_err(|e| StateError::TaskFailed(format!("poller for {}: {}", self.tuner, e)))?;
        tracing::info!(tuner = %self.tuner, "Stopped tuner monitor");
        Ok(())
    }
}

impl Drop for TunerMonitor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for TunerMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunerMonitor")
            .field("tuner", &self.tuner)
            .field("state", &self.state())
            .finish()
    }
}

/// Everything an application needs to watch a set of devices
pub struct MonitorSession {
    config: MonitorConfig,
    registry: Arc<DeviceRegistry>,
    monitors: BTreeMap<(DeviceId, u8), TunerMonitor>,
    token: CancellationToken,
    device_map: Option<(CancellationToken, JoinHandle<()>)>,
}

impl MonitorSession {
    /// Create a session with an empty registry
    pub fn new(transport: Arc<dyn DeviceTransport>, config: MonitorConfig) -> Self {
        Self {
            config,
            registry: Arc::new(DeviceRegistry::new(transport)),
            monitors: BTreeMap::new(),
            token: CancellationToken::new(),
            device_map: None,
        }
    }

    /// Find devices and populate their details
    ///
    /// Resolves the broadcast address, discovers on it, adds each fallback
    /// address not already found, then refreshes details. A step that fails
    /// is logged and the bootstrap continues with what it has.
    pub async fn bootstrap(transport: Arc<dyn DeviceTransport>, config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let session = Self::new(transport, config);

        let provider = session.config.link_provider();
        match broadcast_or_none(provider.as_ref()) {
            Some(broadcast) => {
                tracing::info!(broadcast = %broadcast, "Discovering devices");
                if let Err(e) = session.registry.discover(broadcast).await {
                    tracing::warn!(error = %e, "Broadcast discovery failed");
                }
            }
            None => tracing::warn!("No usable network link, skipping broadcast discovery"),
        }

        for ip in &session.config.fallback_addresses {
            if session.registry.devices().iter().any(|d| d.ip == *ip) {
                continue;
            }
            if let Err(e) = session.registry.add_device(*ip).await {
                tracing::warn!(ip = %ip, error = %e, "Could not add device");
            }
        }

        if let Err(e) = session.registry.refresh().await {
            tracing::warn!(error = %e, "Device details incomplete");
        }

        tracing::info!(
            devices = session.registry.len(),
            tuners = session.registry.tuners().len(),
            "Bootstrap complete"
        );
        Ok(session)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Start a monitor for every registered tuner that does not have one
    ///
    /// Returns how many monitors were started.
    pub fn start_monitors(&mut self) -> usize {
        let transport = Arc::clone(self.registry.transport());
        let mut started = 0;

        for tuner in self.registry.tuners() {
            let key = (tuner.device_id.clone(), tuner.index);
            if self.monitors.contains_key(&key) {
                continue;
            }
            let monitor = TunerMonitor::start_with_token(
                Arc::clone(&transport),
                tuner,
                &self.config,
                self.token.child_token(),
            );
            self.monitors.insert(key, monitor);
            started += 1;
        }

        started
    }

    pub fn monitor(&self, id: &DeviceId, index: u8) -> Option<&TunerMonitor> {
        self.monitors.get(&(id.clone(), index))
    }

    /// Running monitors, ordered by device id then tuner index
    pub fn monitors(&self) -> impl Iterator<Item = &TunerMonitor> {
        self.monitors.values()
    }

    /// Tune a registered tuner, whether or not it is being monitored
    pub async fn set_channel(&self, id: &DeviceId, index: u8, channel: u32) -> Result<()> {
        let tuner = self.registry.tuner(id, index)?;
        tracing::info!(tuner = %tuner, channel, "Setting channel");
        self.registry.transport().set_channel(&tuner, channel).await?;
        Ok(())
    }

    /// Start the whole-registry poller and return a reader for its snapshots
    ///
    /// Calling this again returns a reader for a fresh poller; the previous
    /// one is cancelled.
    pub fn start_device_map(&mut self) -> StateReader<DeviceMapSnapshot> {
        let publisher = Publisher::new();
        let reader = publisher.reader();

        let token = self.token.child_token();
        let poller = DeviceMapPoller::new(Arc::clone(&self.registry), self.config.poll_interval);
        let task = poller.spawn(publisher, token.clone());
        if let Some((previous, _)) = self.device_map.replace((token, task)) {
            previous.cancel();
        }

        reader
    }

    /// Stop every poller and wait for them to exit
    pub async fn shutdown(mut self) -> Result<()> {
        self.token.cancel();

        let mut first_error = None;
        for (_, monitor) in std::mem::take(&mut self.monitors) {
            if let Err(e) = monitor.stop().await {
                tracing::error!(error = %e, "Monitor did not stop cleanly");
                first_error.get_or_insert(e);
            }
        }

        if let Some((_, task)) = self.device_map.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Device map poller did not stop cleanly");
                first_error.get_or_insert(StateError::TaskFailed(format!("device map poller: {}", e)));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for MonitorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorSession")
            .field("registry", &self.registry)
            .field("monitors", &self.monitors.len())
            .finish()
    }
}
