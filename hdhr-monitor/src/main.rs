use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub mod display;

use display::{render_devices, render_snapshot, OutputFormat};
use hdhr_api::{DeviceId, HdhrClient};
use hdhr_state::logging::{self, LoggingMode};
use hdhr_state::{DeviceMapPoller, MonitorConfig, MonitorSession};

/// HDHomeRun tuner monitor
///
/// Discovers HDHomeRun devices on the local network and reports what every
/// tuner is receiving, refreshing on a fixed interval.
#[derive(Parser, Debug)]
#[command(name = "hdhr-monitor")]
#[command(about = "Watch HDHomeRun tuners: channel, program and signal quality")]
#[command(version)]
pub struct Args {
    /// Poll interval in milliseconds
    #[arg(short, long, default_value = "1000")]
    pub interval_ms: u64,

    /// Per-request timeout in milliseconds
    #[arg(short, long, default_value = "2000")]
    pub timeout_ms: u64,

    /// Extra attempts after a request times out
    #[arg(short, long, default_value = "1")]
    pub retries: u32,

    /// How long discovery collects replies, in milliseconds
    #[arg(short = 'w', long, default_value = "3000")]
    pub discovery_window_ms: u64,

    /// Control and discovery port
    #[arg(long, default_value = "65001")]
    pub port: u16,

    /// Device address to add when broadcast discovery misses it (repeatable)
    #[arg(short, long = "device", value_name = "IP")]
    pub devices: Vec<Ipv4Addr>,

    /// Link address used to derive the broadcast address, e.g. 192.168.1.42/24
    #[arg(long, value_name = "IP/PREFIX")]
    pub link: Option<String>,

    /// Prefix length to use instead of the detected interface netmask
    #[arg(long, value_name = "BITS", conflicts_with = "link")]
    pub prefix_len: Option<u8>,

    /// Print snapshots as JSON, one per line
    #[arg(long)]
    pub json: bool,

    /// Print a single snapshot and exit
    #[arg(long)]
    pub once: bool,

    /// Logging mode (silent, development, debug, json)
    #[arg(long)]
    pub log_mode: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Continuously print tuner state (default)
    Watch,
    /// List discovered devices and exit
    List,
    /// Tune a tuner to a channel number
    SetChannel {
        /// Device id, e.g. 1040ABCD
        device: DeviceId,
        /// Tuner index
        tuner: u8,
        /// Channel number; need not be in the lineup
        channel: u32,
    },
}

impl Args {
    /// Apply `HDHR_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("HDHR_INTERVAL_MS") {
            self.interval_ms = value
                .parse()
                .context("Invalid HDHR_INTERVAL_MS environment variable")?;
        }

        if let Ok(value) = std::env::var("HDHR_TIMEOUT_MS") {
            self.timeout_ms = value
                .parse()
                .context("Invalid HDHR_TIMEOUT_MS environment variable")?;
        }

        if let Ok(value) = std::env::var("HDHR_RETRIES") {
            self.retries = value
                .parse()
                .context("Invalid HDHR_RETRIES environment variable")?;
        }

        if let Ok(value) = std::env::var("HDHR_DISCOVERY_WINDOW_MS") {
            self.discovery_window_ms = value
                .parse()
                .context("Invalid HDHR_DISCOVERY_WINDOW_MS environment variable")?;
        }

        if let Ok(value) = std::env::var("HDHR_PORT") {
            self.port = value
                .parse()
                .context("Invalid HDHR_PORT environment variable")?;
        }

        if let Ok(value) = std::env::var("HDHR_DEVICES") {
            let extra = parse_address_list(&value)
                .context("Invalid HDHR_DEVICES environment variable")?;
            self.devices.extend(extra);
        }

        if let Ok(value) = std::env::var("HDHR_LINK") {
            self.link = Some(value);
        }

        if let Ok(value) = std::env::var("HDHR_PREFIX_LEN") {
            self.prefix_len = Some(
                value
                    .parse()
                    .context("Invalid HDHR_PREFIX_LEN environment variable")?,
            );
        }

        if std::env::var("HDHR_JSON").is_ok() {
            self.json = true;
        }

        Ok(())
    }

    /// Build and validate the session configuration
    pub fn monitor_config(&self) -> Result<MonitorConfig> {
        let mut config = MonitorConfig {
            poll_interval: Duration::from_millis(self.interval_ms),
            request_timeout: Duration::from_millis(self.timeout_ms),
            request_retries: self.retries,
            discovery_window: Duration::from_millis(self.discovery_window_ms),
            control_port: self.port,
            fallback_addresses: self.devices.clone(),
            host_prefix_len: self.prefix_len,
            ..MonitorConfig::default()
        };

        if let Some(link) = &self.link {
            let (ip, prefix) = parse_link(link)?;
            config = config.with_static_link(ip, prefix);
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Parse `a.b.c.d/prefix`
fn parse_link(value: &str) -> Result<(Ipv4Addr, u8)> {
    let (ip, prefix) = value
        .split_once('/')
        .ok_or_else(|| anyhow::anyhow!("Link '{}' must look like 192.168.1.42/24", value))?;
    let ip = ip
        .trim()
        .parse()
        .with_context(|| format!("Invalid link address '{}'", ip))?;
    let prefix = prefix
        .trim()
        .parse()
        .with_context(|| format!("Invalid link prefix '{}'", prefix))?;
    Ok((ip, prefix))
}

fn parse_address_list(value: &str) -> Result<Vec<Ipv4Addr>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().with_context(|| format!("Invalid address '{}'", s)))
        .collect()
}

fn init_logging(args: &Args) -> Result<()> {
    match (&args.log_mode, std::env::var("HDHR_LOG_MODE")) {
        (Some(mode), _) => logging::init_logging(mode.parse()?)?,
        (None, Ok(_)) => logging::init_logging_from_env()?,
        (None, Err(_)) => logging::init_logging(LoggingMode::Development)?,
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config = args.monitor_config()?;
    let format = args.output_format();
    let transport = Arc::new(HdhrClient::with_config(config.client_config()));

    info!(
        interval = ?config.poll_interval,
        timeout = ?config.request_timeout,
        fallback_devices = config.fallback_addresses.len(),
        "Starting monitor"
    );

    let mut session = MonitorSession::bootstrap(transport, config)
        .await
        .context("Failed to bootstrap monitor session")?;

    if session.registry().is_empty() {
        warn!("No HDHomeRun devices found");
        eprintln!("No devices found. Check that:");
        eprintln!("  - the devices are powered on and on this network");
        eprintln!("  - UDP broadcast on port {} is not blocked", session.config().control_port);
        eprintln!("  - or pass their addresses with --device");
        return Err(anyhow::anyhow!("No devices found"));
    }

    let result = match args.command.clone().unwrap_or(Command::Watch) {
        Command::List => {
            print!("{}", render_devices(&session.registry().devices()));
            Ok(())
        }
        Command::SetChannel {
            device,
            tuner,
            channel,
        } => session
            .set_channel(&device, tuner, channel)
            .await
            .map(|()| println!("{}-{} tuned to {}", device, tuner, channel))
            .with_context(|| format!("Failed to set channel on {}-{}", device, tuner)),
        Command::Watch if args.once => {
            let poller = DeviceMapPoller::new(
                Arc::clone(session.registry()),
                session.config().poll_interval,
            );
            let snapshot = poller.poll_once().await;
            print!("{}", with_newline(render_snapshot(&snapshot, format)?));
            Ok(())
        }
        Command::Watch => watch(&mut session, format).await,
    };

    session.shutdown().await.context("Monitor did not shut down cleanly")?;
    result
}

async fn watch(session: &mut MonitorSession, format: OutputFormat) -> Result<()> {
    let mut updates = session.start_device_map().subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                return Ok(());
            }
            snapshot = updates.next() => {
                let Some(snapshot) = snapshot else {
                    return Err(anyhow::anyhow!("Device map poller stopped unexpectedly"));
                };
                print!("{}", with_newline(render_snapshot(&snapshot, format)?));
            }
        }
    }
}

fn with_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();
    args.apply_env().context("Failed to read environment")?;
    init_logging(&args).context("Failed to initialize logging")?;

    if let Err(e) = run(args).await {
        error!("hdhr-monitor failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
