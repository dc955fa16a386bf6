//! Simple tuner discovery that outputs JSON for scripting
//!
//! Usage: cargo run -p hdhr-discovery --example discover_json [window-secs]

use std::time::Duration;

use hdhr_discovery::{get_with_timeout, HostLink};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let window = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);

    let devices = get_with_timeout(&HostLink::default(), Duration::from_secs(window)).await?;

    println!("{}", serde_json::to_string_pretty(&devices)?);
    Ok(())
}
