use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use hdhr_discovery::Discoverer;
use hdhr_protocol::{frame_len, getset_request, GetSetReply, Packet, CONTROL_PORT, HEADER_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{ApiError, Result};
use crate::models::{Channel, Device, DeviceDetails, Lineup, Tuner, TunerStatus};
use crate::parse;
use crate::transport::DeviceTransport;

/// Connection and timing settings for [`HdhrClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Control port for TCP get/set and UDP discovery
    pub port: u16,
    /// Bound on one request attempt
    pub request_timeout: Duration,
    /// Extra attempts after a timeout
    pub retries: u32,
    /// How long broadcast discovery collects replies
    pub discovery_window: Duration,
    /// Upper bound when scanning for tuners a device does not report
    pub max_scanned_tuners: u8,
    /// Unicast addresses that also receive each discover request
    pub fallback_addresses: Vec<Ipv4Addr>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: CONTROL_PORT,
            request_timeout: Duration::from_secs(2),
            retries: 1,
            discovery_window: Duration::from_secs(3),
            max_scanned_tuners: 8,
            fallback_addresses: Vec::new(),
        }
    }
}

/// A client for tuner devices over the TCP control protocol
///
/// Every request opens its own connection, which lives inside the request
/// future. Dropping the future (for example when a poller is cancelled)
/// closes the socket immediately.
///
/// ```no_run
/// use hdhr_api::{DeviceTransport, HdhrClient};
///
/// # async fn run() -> hdhr_api::Result<()> {
/// let client = HdhrClient::new();
/// let device = client.add_device("192.168.1.86".parse().unwrap()).await?;
/// let details = client.get_device_details(&device).await?;
/// println!("{} runs {}", details.model, details.version);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct HdhrClient {
    config: ClientConfig,
}

impl HdhrClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn discoverer(&self) -> Discoverer {
        Discoverer::new()
            .with_port(self.config.port)
            .with_window(self.config.discovery_window)
            .with_request_timeout(self.config.request_timeout, self.config.retries)
            .with_fallback_addresses(self.config.fallback_addresses.clone())
    }

    /// Read a variable
    pub async fn get(&self, ip: Ipv4Addr, name: &str) -> Result<String> {
        self.request(ip, name, None).await
    }

    /// Read a variable that older firmware may not know, `None` if rejected
    pub async fn get_optional(&self, ip: Ipv4Addr, name: &str) -> Result<Option<String>> {
        match self.get(ip, name).await {
            Ok(value) => Ok(Some(value)),
            Err(ApiError::Rejected { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a variable, returning the value the device echoes back
    pub async fn set(&self, ip: Ipv4Addr, name: &str, value: &str) -> Result<String> {
        self.request(ip, name, Some(value)).await
    }

    async fn request(&self, ip: Ipv4Addr, name: &str, value: Option<&str>) -> Result<String> {
        let attempts = self.config.retries + 1;

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.config.request_timeout, self.exchange(ip, name, value)).await {
                Ok(result) => return result,
                Err(_) => {
                    tracing::debug!(ip = %ip, name, attempt, "Request timed out");
                }
            }
        }

        Err(ApiError::Timeout {
            name: name.to_string(),
            timeout: self.config.request_timeout,
        })
    }

    /// One request/reply on a fresh connection
    async fn exchange(&self, ip: Ipv4Addr, name: &str, value: Option<&str>) -> Result<String> {
        let mut stream = TcpStream::connect((ip, self.config.port))
            .await
            .map_err(|e| ApiError::DeviceUnreachable(format!("{}: {}", ip, e)))?;

        let frame = getset_request(name, value).encode()?;
        stream
            .write_all(&frame)
            .await
            .map_err(|e| ApiError::Network(format!("Failed to send request: {}", e)))?;

        let reply = read_frame(&mut stream).await?;
        let reply = GetSetReply::from_packet(&Packet::decode(&reply)?)?;

        reply.outcome.map_err(|message| ApiError::Rejected {
            name: name.to_string(),
            message,
        })
    }

    async fn scan_tuner_count(&self, ip: Ipv4Addr) -> Result<u8> {
        let mut count = 0;
        while count < self.config.max_scanned_tuners {
            match self.get(ip, &format!("/tuner{}/status", count)).await {
                Ok(_) => count += 1,
                Err(ApiError::Rejected { .. }) => break,
                Err(e) => return Err(e),
            }
        }
        tracing::debug!(ip = %ip, count, "Counted tuners by status scan");
        Ok(count)
    }
}

async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; HEADER_LEN];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| ApiError::Network(format!("Failed to read reply header: {}", e)))?;

    let total = frame_len(&buf).ok_or_else(|| ApiError::ProtocolParse("short reply header".to_string()))?;
    buf.resize(total, 0);
    stream
        .read_exact(&mut buf[HEADER_LEN..])
        .await
        .map_err(|e| ApiError::Network(format!("Failed to read reply body: {}", e)))?;

    Ok(buf)
}

#[async_trait]
impl DeviceTransport for HdhrClient {
    async fn discover(&self, broadcast: Ipv4Addr) -> Result<Vec<Device>> {
        let found = self.discoverer().discover(broadcast).await?;
        Ok(found.into_iter().map(Device::from).collect())
    }

    async fn add_device(&self, ip: Ipv4Addr) -> Result<Device> {
        let found = self.discoverer().discover_at(ip).await?;
        Ok(Device::from(found))
    }

    async fn get_device_details(&self, device: &Device) -> Result<DeviceDetails> {
        let model = self.get(device.ip, "/sys/model").await?;
        let version = self.get(device.ip, "/sys/version").await?;
        let features = self.get_optional(device.ip, "/sys/features").await?;
        let copyright = self.get_optional(device.ip, "/sys/copyright").await?;

        let tuner_count = if device.tuners.is_empty() {
            self.scan_tuner_count(device.ip).await?
        } else {
            device.tuners.len() as u8
        };

        Ok(DeviceDetails {
            model: model.trim().to_string(),
            version: version.trim().to_string(),
            copyright: copyright.as_deref().map(str::trim).unwrap_or_default().to_string(),
            features: features.as_deref().map(parse::parse_features).unwrap_or_default(),
            tuner_count,
        })
    }

    async fn get_channel(&self, tuner: &Tuner) -> Result<Option<u32>> {
        let value = self.get(tuner.ip, &tuner.variable("channel")).await?;
        parse::parse_channel(&value)
    }

    async fn get_stream_info(&self, tuner: &Tuner) -> Result<BTreeMap<u16, Channel>> {
        let value = self.get(tuner.ip, &tuner.variable("streaminfo")).await?;
        parse::parse_stream_info(&value)
    }

    async fn get_status(&self, tuner: &Tuner) -> Result<TunerStatus> {
        let value = self.get(tuner.ip, &tuner.variable("status")).await?;
        parse::parse_status(&value)
    }

    async fn get_lineup(&self, tuner: &Tuner) -> Result<Lineup> {
        let value = self.get(tuner.ip, &tuner.variable("lineup")).await?;
        parse::parse_lineup(&value)
    }

    async fn set_channel(&self, tuner: &Tuner, channel: u32) -> Result<()> {
        let value = format!("auto:{}", channel);
        match self.set(tuner.ip, &tuner.variable("channel"), &value).await {
            Ok(_) => {
                tracing::info!(tuner = %tuner, channel, "Channel set");
                Ok(())
            }
            Err(ApiError::Rejected { message, .. }) => Err(ApiError::ChannelSet(message)),
            Err(ApiError::Timeout { timeout, .. }) => Err(ApiError::ChannelSet(format!(
                "no acknowledgement within {:?}",
                timeout
            ))),
            Err(e) => Err(ApiError::ChannelSet(format!("not acknowledged: {}", e))),
        }
    }
}
