use std::time::Duration;

use hdhr_discovery::DiscoveryError;
use hdhr_protocol::ProtocolError;
use thiserror::Error;

/// High-level API errors for tuner device operations
///
/// Transport details (sockets, frames, retries) are folded into these
/// variants so callers can tell an unreachable device from a device that
/// answered with something unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No connection could be established, or the device never answered
    #[error("Device unreachable: {0}")]
    DeviceUnreachable(String),

    /// The device answered, but the reply could not be decoded or parsed
    #[error("Protocol parse error: {0}")]
    ProtocolParse(String),

    /// A channel-set command was rejected or not acknowledged
    #[error("Channel set failed: {0}")]
    ChannelSet(String),

    /// The device answered a get/set request with an error message
    #[error("Device rejected {name}: {message}")]
    Rejected { name: String, message: String },

    /// Connection dropped or socket I/O failed mid-exchange
    #[error("Network error: {0}")]
    Network(String),

    /// Every attempt timed out
    #[error("Request for {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;

impl From<ProtocolError> for ApiError {
    fn from(error: ProtocolError) -> Self {
        ApiError::ProtocolParse(error.to_string())
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(error: DiscoveryError) -> Self {
        match error {
            DiscoveryError::DeviceUnreachable(ip) => ApiError::DeviceUnreachable(ip.to_string()),
            DiscoveryError::Network(msg) => ApiError::Network(msg),
            DiscoveryError::Protocol(e) => e.into(),
        }
    }
}
