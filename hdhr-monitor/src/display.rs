//! Text and JSON rendering of device snapshots

use std::fmt::Write;

use anyhow::{Context, Result};
use hdhr_api::{lineup_display, Device, TunerState};
use hdhr_state::{DeviceMapSnapshot, DeviceSnapshot};

/// Output format for snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Render a full device map in the chosen format
pub fn render_snapshot(snapshot: &DeviceMapSnapshot, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string(snapshot).context("Failed to serialize snapshot")
        }
        OutputFormat::Text => {
            if snapshot.is_empty() {
                return Ok("No devices\n".to_string());
            }
            Ok(snapshot.values().map(render_device).collect())
        }
    }
}

fn render_device(device: &DeviceSnapshot) -> String {
    let mut out = String::new();
    let model = device.model.as_deref().unwrap_or("unavailable");
    let version = device.version.as_deref().unwrap_or("?");
    let _ = writeln!(out, "{} at {} [{} {}]", device.id, device.ip, model, version);

    for tuner in &device.tuners {
        let _ = writeln!(out, "  tuner{}  {}", tuner.index, render_tuner(&tuner.state));
    }
    out
}

/// One-line summary of a tuner
pub fn render_tuner(state: &TunerState) -> String {
    let Some(channel) = state.channel_number else {
        return lineup_display(None);
    };

    let guide = match &state.channel_info {
        Some(info) => format!("{} {}", info.program, info.callsign),
        None => lineup_display(state.lineup.get(&channel).and_then(Option::as_ref)),
    };

    format!(
        "ch {:<4} {:<20} ss={:>3} snq={:>3} seq={:>3} lock={}",
        channel, guide, state.status.ss, state.status.snq, state.status.seq, state.status.lock
    )
}

/// Device list printed by the `list` command
pub fn render_devices(devices: &[Device]) -> String {
    let mut out = String::new();
    for device in devices {
        let model = device
            .details
            .as_ref()
            .map(|d| d.model.as_str())
            .unwrap_or("unknown model");
        let _ = writeln!(
            out,
            "{}  {:<15}  {}  {} tuner(s)",
            device.id,
            device.ip.to_string(),
            model,
            device.tuners.len()
        );
    }
    out
}
