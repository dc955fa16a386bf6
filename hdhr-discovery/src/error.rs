//! Error types for broadcast resolution and discovery.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Failure to derive a broadcast address from the active link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No active network or no link properties available
    #[error("No active network")]
    NoNetwork,

    /// The active link carries no IPv4 address
    #[error("No IPv4 address on the active link")]
    NoAddress,

    /// The prefix length or resulting bytes do not form an IPv4 address
    #[error("Cannot construct broadcast address: {0}")]
    AddressConstruction(String),
}

/// Error type for discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Socket creation or send/receive failure
    #[error("Network error: {0}")]
    Network(String),

    /// A unicast discover request got no reply within the timeout
    #[error("Device at {0} did not respond")]
    DeviceUnreachable(Ipv4Addr),

    /// A reply could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] hdhr_protocol::ProtocolError),
}

/// Convenience Result type alias for discovery operations.
///
/// Equivalent to `std::result::Result<T, DiscoveryError>`.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
