//! Per-tuner polling loop
//!
//! A [`TunerPoller`] runs `Idle -> Polling -> Stopped` (see [`PollerState`]).
//! Each cycle runs the
//! four tuner queries, then publishes the assembled [`TunerState`]. A cycle
//! that fails publishes [`TunerState::no_signal`] and polling carries on.
//! Only cancellation stops the loop.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hdhr_api::{ApiError, DeviceTransport, Tuner, TunerState};
use parking_lot::Mutex;
use state_store::Publisher;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a poller task
///
/// Transitions only move forward; a stopped poller is never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Created but not yet running
    Idle,
    /// Loop is running cycles
    Polling,
    /// Loop has exited after cancellation
    Stopped,
}

impl PollerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PollerState::Idle,
            1 => PollerState::Polling,
            _ => PollerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PollerState::Idle => 0,
            PollerState::Polling => 1,
            PollerState::Stopped => 2,
        }
    }
}

impl std::fmt::Display for PollerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PollerState::Idle => "idle",
            PollerState::Polling => "polling",
            PollerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters shared between a poller task and its owner
#[derive(Debug, Default)]
pub struct PollerStats {
    state: AtomicU8,
    cycles: AtomicU64,
    degraded_cycles: AtomicU64,
    last_error: Mutex<Option<ApiError>>,
}

impl PollerStats {
    pub fn state(&self) -> PollerState {
        PollerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PollerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Cycles that ended in a publish
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Cycles that published a no-signal state because a query failed
    pub fn degraded_cycles(&self) -> u64 {
        self.degraded_cycles.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<ApiError> {
        self.last_error.lock().clone()
    }

    fn record(&self, error: Option<ApiError>) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = error {
            self.degraded_cycles.fetch_add(1, Ordering::Relaxed);
            *self.last_error.lock() = Some(error);
        }
    }
}

/// Marks the poller stopped however `run` exits, including when its task is aborted
struct StopOnExit<'a>(&'a PollerStats);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        self.0.set_state(PollerState::Stopped);
    }
}

/// Polls one tuner on a fixed interval
pub struct TunerPoller {
    tuner: Tuner,
    transport: Arc<dyn DeviceTransport>,
    interval: Duration,
    stats: Arc<PollerStats>,
}

impl TunerPoller {
    pub fn new(tuner: Tuner, transport: Arc<dyn DeviceTransport>, interval: Duration) -> Self {
        Self {
            tuner,
            transport,
            interval,
            stats: Arc::new(PollerStats::default()),
        }
    }

    pub fn tuner(&self) -> &Tuner {
        &self.tuner
    }

    pub fn stats(&self) -> Arc<PollerStats> {
        Arc::clone(&self.stats)
    }

    /// Run the four queries once and assemble the result
    pub async fn poll_cycle(&self) -> Result<TunerState, ApiError> {
        self.transport.get_tuner_state(&self.tuner).await
    }

    /// Poll until `token` is cancelled, publishing one state per cycle
    ///
    /// Cancellation is checked before each cycle and before each publish,
    /// and races any in-flight request. A cancelled request future is
    /// dropped, which closes its connection.
    pub async fn run(self, publisher: Publisher<TunerState>, token: CancellationToken) {
        let tuner = self.tuner.to_string();
        let stats = Arc::clone(&self.stats);
        let _stopped = StopOnExit(&stats);
        stats.set_state(PollerState::Polling);
        tracing::debug!(tuner = %tuner, interval = ?self.interval, "Tuner poller started");

        loop {
            if token.is_cancelled() {
                break;
            }

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                outcome = self.poll_cycle() => outcome,
            };

            let (state, error) = match outcome {
                Ok(state) => (state, None),
                Err(e) => {
                    tracing::warn!(tuner = %tuner, error = %e, "Poll cycle degraded, publishing no signal");
                    (TunerState::no_signal(), Some(e))
                }
            };

            if token.is_cancelled() {
                break;
            }

            publisher.publish(state);
            self.stats.record(error);
            tracing::trace!(tuner = %tuner, cycle = self.stats.cycles(), "Published tuner state");

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::debug!(tuner = %tuner, cycles = self.stats.cycles(), "Tuner poller stopped");
    }

    /// Run the poller on a new task
    pub fn spawn(self, publisher: Publisher<TunerState>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(publisher, token))
    }
}

impl std::fmt::Debug for TunerPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunerPoller")
            .field("tuner", &self.tuner)
            .field("interval", &self.interval)
            .finish()
    }
}
