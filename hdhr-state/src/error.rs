//! Error types for hdhr-state

use hdhr_api::{ApiError, DeviceId};
use thiserror::Error;

/// Result type for hdhr-state operations
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors that can occur while managing devices and monitors
#[derive(Debug, Error)]
pub enum StateError {
    /// Error from hdhr-api
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Device not present in the registry
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// Tuner index not present on the device
    #[error("Tuner {index} not found on device {device_id}")]
    TunerNotFound { device_id: DeviceId, index: u8 },

    /// One or more devices failed to refresh; the rest were updated
    #[error("Refresh failed for {} device(s): {}", .0.len(), describe_failures(.0))]
    RefreshFailed(Vec<(DeviceId, ApiError)>),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// A background task panicked or was aborted
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

fn describe_failures(failures: &[(DeviceId, ApiError)]) -> String {
    failures
        .iter()
        .map(|(id, e)| format!("{}: {}", id, e))
        .collect::<Vec<_>>()
        .join("; ")
}
