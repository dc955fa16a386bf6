//! Discover request/reply exchange over UDP.
//!
//! Broadcast discovery sends one request to the subnet broadcast address (and
//! to any configured fallback addresses, for networks that drop broadcasts)
//! and collects replies until the window closes. Unicast discovery targets a
//! single known address and retries once before giving up.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use hdhr_protocol::{discover_request, DiscoverReply, Packet, CONTROL_PORT, DEVICE_TYPE_TUNER};
use tokio::net::UdpSocket;

use crate::error::{DiscoveryError, Result};
use crate::{DeviceId, DiscoveredDevice};

/// Largest datagram a device sends in reply
const RECV_BUFFER_LEN: usize = 2048;

/// Sends discover requests and collects replies
#[derive(Debug, Clone)]
pub struct Discoverer {
    port: u16,
    window: Duration,
    request_timeout: Duration,
    retries: u32,
    fallback_addresses: Vec<Ipv4Addr>,
}

impl Discoverer {
    /// Discoverer with a 3 second collection window and a 2 second unicast timeout
    pub fn new() -> Self {
        Self {
            port: CONTROL_PORT,
            window: Duration::from_secs(3),
            request_timeout: Duration::from_secs(2),
            retries: 1,
            fallback_addresses: Vec::new(),
        }
    }

    /// Destination port for discover requests
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// How long broadcast discovery collects replies
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Per-attempt timeout and retry count for unicast discovery
    pub fn with_request_timeout(mut self, timeout: Duration, retries: u32) -> Self {
        self.request_timeout = timeout;
        self.retries = retries;
        self
    }

    /// Unicast addresses that also receive every broadcast discover request
    pub fn with_fallback_addresses(mut self, addresses: Vec<Ipv4Addr>) -> Self {
        self.fallback_addresses = addresses;
        self
    }

    /// Discover all tuner devices reachable through `broadcast`
    ///
    /// Devices are de-duplicated by id; a device answering on several
    /// addresses is reported once, with the first address seen.
    pub async fn discover(&self, broadcast: Ipv4Addr) -> Result<Vec<DiscoveredDevice>> {
        let socket = bind_socket().await?;
        let frame = discover_request().encode()?;

        let mut targets = vec![broadcast];
        targets.extend(self.fallback_addresses.iter().copied().filter(|a| *a != broadcast));

        for target in &targets {
            if let Err(e) = socket.send_to(&frame, (*target, self.port)).await {
                // One unreachable fallback must not abort the whole search.
                tracing::warn!(target = %target, error = %e, "Failed to send discover request");
            }
        }

        let mut devices: HashMap<DeviceId, DiscoveredDevice> = HashMap::new();
        let mut buf = [0u8; RECV_BUFFER_LEN];
        let deadline = tokio::time::Instant::now() + self.window;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }

            match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
                Ok(Ok((n, src))) => match parse_reply(&buf[..n], src) {
                    Some(device) => {
                        tracing::debug!(device_id = %device.id, ip = %device.ip, "Discovered device");
                        devices.entry(device.id.clone()).or_insert(device);
                    }
                    None => {
                        tracing::trace!(src = %src, len = n, "Ignoring non-tuner or malformed reply");
                    }
                },
                Ok(Err(e)) => {
                    tracing::trace!(error = %e, "Discovery recv error");
                }
                Err(_) => break,
            }
        }

        let mut result: Vec<DiscoveredDevice> = devices.into_values().collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::info!(count = result.len(), broadcast = %broadcast, "Discovery complete");
        Ok(result)
    }

    /// Query a single known address as if it had been discovered
    ///
    /// # Errors
    ///
    /// `DiscoveryError::DeviceUnreachable` when no valid reply arrives from
    /// `ip` within the timeout on any attempt.
    pub async fn discover_at(&self, ip: Ipv4Addr) -> Result<DiscoveredDevice> {
        let socket = bind_socket().await?;
        let frame = discover_request().encode()?;
        let mut buf = [0u8; RECV_BUFFER_LEN];

        for attempt in 0..=self.retries {
            socket
                .send_to(&frame, (ip, self.port))
                .await
                .map_err(|e| DiscoveryError::Network(format!("Failed to send discover request: {}", e)))?;

            let deadline = tokio::time::Instant::now() + self.request_timeout;
            loop {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
                    Ok(Ok((n, src))) if src.ip() == IpAddr::V4(ip) => {
                        if let Some(device) = parse_reply(&buf[..n], src) {
                            return Ok(device);
                        }
                    }
                    Ok(Ok(_)) => continue,
                    Ok(Err(e)) => {
                        tracing::trace!(error = %e, "Discovery recv error");
                    }
                    Err(_) => break,
                }
            }

            tracing::debug!(ip = %ip, attempt = attempt + 1, "Unicast discover timed out");
        }

        Err(DiscoveryError::DeviceUnreachable(ip))
    }
}

impl Default for Discoverer {
    fn default() -> Self {
        Self::new()
    }
}

async fn bind_socket() -> Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| DiscoveryError::Network(format!("Failed to bind UDP socket: {}", e)))?;
    socket
        .set_broadcast(true)
        .map_err(|e| DiscoveryError::Network(format!("Failed to enable broadcast: {}", e)))?;
    Ok(socket)
}

/// Decode one datagram into a tuner device, skipping anything else
fn parse_reply(datagram: &[u8], src: SocketAddr) -> Option<DiscoveredDevice> {
    let ip = match src.ip() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => return None,
    };

    let packet = Packet::decode(datagram).ok()?;
    let reply = DiscoverReply::from_packet(&packet).ok()?;
    if reply.device_type != DEVICE_TYPE_TUNER {
        return None;
    }

    Some(DiscoveredDevice {
        id: DeviceId::from_u32(reply.device_id),
        ip,
        tuner_count: reply.tuner_count,
        base_url: reply.base_url,
        lineup_url: reply.lineup_url,
    })
}
