//! Configuration types for monitor sessions
//!
//! `MonitorConfig` controls polling cadence, request timing, discovery, and
//! how the local network link is found.

use std::net::Ipv4Addr;
use std::time::Duration;

use hdhr_api::{ClientConfig, CONTROL_PORT};
use hdhr_discovery::{HostLink, LinkProvider, StaticLink};

use crate::error::{Result, StateError};

/// Configuration for a monitor session
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Sleep between the end of one poll cycle and the start of the next
    /// Default: 1 second
    pub poll_interval: Duration,

    /// Bound on a single request attempt
    /// Default: 2 seconds
    pub request_timeout: Duration,

    /// Extra attempts after a request times out
    /// Default: 1
    pub request_retries: u32,

    /// How long broadcast discovery collects replies
    /// Default: 3 seconds
    pub discovery_window: Duration,

    /// Upper bound when scanning for tuners a device does not report
    /// Default: 8
    pub max_scanned_tuners: u8,

    /// Control and discovery port
    /// Default: 65001
    pub control_port: u16,

    /// Devices added by address, for networks that drop broadcasts
    /// Default: none
    pub fallback_addresses: Vec<Ipv4Addr>,

    /// Fixed link address and prefix; the host's outbound interface otherwise
    /// Default: none
    pub static_link: Option<(Ipv4Addr, u8)>,

    /// Prefix length to use instead of the host interface's netmask
    /// Default: none
    pub host_prefix_len: Option<u8>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(2),
            request_retries: 1,
            discovery_window: Duration::from_secs(3),
            max_scanned_tuners: 8,
            control_port: CONTROL_PORT,
            fallback_addresses: Vec::new(),
            static_link: None,
            host_prefix_len: None,
        }
    }
}

impl MonitorConfig {
    /// Create a MonitorConfig optimized for responsive dashboards
    pub fn fast_polling() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            request_timeout: Duration::from_secs(1),
            discovery_window: Duration::from_secs(1),
            ..Default::default()
        }
    }

    /// Create a MonitorConfig optimized for resource efficiency
    pub fn resource_efficient() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(3),
            request_retries: 0,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval == Duration::ZERO {
            return Err(StateError::Config(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout == Duration::ZERO {
            return Err(StateError::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.discovery_window == Duration::ZERO {
            return Err(StateError::Config(
                "Discovery window must be greater than 0".to_string(),
            ));
        }

        if self.max_scanned_tuners == 0 {
            return Err(StateError::Config(
                "Max scanned tuners must be greater than 0".to_string(),
            ));
        }

        if self.control_port == 0 {
            return Err(StateError::Config("Control port must not be 0".to_string()));
        }

        if let Some((_, prefix)) = self.static_link {
            if prefix > 32 {
                return Err(StateError::Config(format!(
                    "Invalid static link prefix /{}: must be at most 32",
                    prefix
                )));
            }
        }

        if let Some(prefix) = self.host_prefix_len {
            if prefix > 32 {
                return Err(StateError::Config(format!(
                    "Invalid host prefix /{}: must be at most 32",
                    prefix
                )));
            }
        }

        Ok(())
    }

    // Builder pattern methods for fluent configuration

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration, retries: u32) -> Self {
        self.request_timeout = timeout;
        self.request_retries = retries;
        self
    }

    pub fn with_fallback_address(mut self, ip: Ipv4Addr) -> Self {
        self.fallback_addresses.push(ip);
        self
    }

    pub fn with_static_link(mut self, ip: Ipv4Addr, prefix_len: u8) -> Self {
        self.static_link = Some((ip, prefix_len));
        self
    }

    /// Settings for the TCP control client
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            port: self.control_port,
            request_timeout: self.request_timeout,
            retries: self.request_retries,
            discovery_window: self.discovery_window,
            max_scanned_tuners: self.max_scanned_tuners,
            fallback_addresses: self.fallback_addresses.clone(),
        }
    }

    /// Source of the link address used to derive the broadcast address
    pub fn link_provider(&self) -> Box<dyn LinkProvider> {
        match self.static_link {
            Some((ip, prefix_len)) => Box::new(StaticLink::new(ip, prefix_len)),
            None => match self.host_prefix_len {
                Some(prefix_len) => Box::new(HostLink::new().with_prefix_len(prefix_len)),
                None => Box::new(HostLink::new()),
            },
        }
    }
}
