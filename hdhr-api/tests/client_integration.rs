//! Integration tests for the TCP control client against a scripted device

mod helpers;

use std::net::Ipv4Addr;
use std::time::Duration;

use hdhr_api::{ApiError, ClientConfig, Device, DeviceId, DeviceTransport, HdhrClient};
use helpers::MockDevice;

fn client_for(device: &MockDevice, timeout: Duration) -> HdhrClient {
    HdhrClient::with_config(ClientConfig {
        port: device.port(),
        request_timeout: timeout,
        retries: 1,
        discovery_window: Duration::from_millis(200),
        ..ClientConfig::default()
    })
}

fn local_device(tuners: u8) -> Device {
    Device::new(DeviceId::from_u32(0x1040_ABCD), Ipv4Addr::LOCALHOST).with_tuner_count(tuners)
}

fn script_sys(device: &MockDevice) {
    device
        .set_value("/sys/model", "hdhomerun4_atsc\n")
        .set_value("/sys/version", "20230713")
        .set_value("/sys/copyright", "Copyright © 2005-2023 Silicondust USA Inc.")
        .set_value(
            "/sys/features",
            "channelmap: us-bcast us-cable\nmodulation: 8vsb qam256\nauto-modulation: auto auto6t\n",
        );
}

#[tokio::test]
async fn test_device_details_scans_unreported_tuner_count() {
    let device = MockDevice::start().await;
    script_sys(&device);
    device
        .set_value("/tuner0/status", "ch=none lock=none ss=0")
        .set_value("/tuner1/status", "ch=none lock=none ss=0");

    let client = client_for(&device, Duration::from_secs(1));
    let details = client.get_device_details(&local_device(0)).await.unwrap();

    assert_eq!(details.model, "hdhomerun4_atsc");
    assert_eq!(details.version, "20230713");
    assert_eq!(details.tuner_count, 2);
    assert!(details.features.supports_auto_modulation());

    let scanned: Vec<String> = device
        .requests()
        .into_iter()
        .map(|(name, _)| name)
        .filter(|name| name.starts_with("/tuner"))
        .collect();
    assert_eq!(scanned, vec!["/tuner0/status", "/tuner1/status", "/tuner2/status"]);
}

#[tokio::test]
async fn test_device_details_trusts_reported_tuner_count() {
    let device = MockDevice::start().await;
    script_sys(&device);

    let client = client_for(&device, Duration::from_secs(1));
    let details = client.get_device_details(&local_device(4)).await.unwrap();

    assert_eq!(details.tuner_count, 4);
    assert!(device.requests().iter().all(|(name, _)| name.starts_with("/sys/")));
}

#[tokio::test]
async fn test_device_details_tolerates_missing_optional_variables() {
    let device = MockDevice::start().await;
    device
        .set_value("/sys/model", "hdhomerun_atsc")
        .set_value("/sys/version", "20150826");

    let client = client_for(&device, Duration::from_secs(1));
    let details = client.get_device_details(&local_device(2)).await.unwrap();

    assert_eq!(details.copyright, "");
    assert!(!details.features.supports_auto_modulation());
}

#[tokio::test]
async fn test_get_tuner_state_assembles_queries() {
    let device = MockDevice::start().await;
    device
        .set_value("/tuner1/channel", "auto:13")
        .set_value("/tuner1/streaminfo", "3: 13.1 WNET\n4: 13.2 KIDS\ntsid=0x0001\n")
        .set_value("/tuner1/status", "ch=8vsb:13 lock=8vsb ss=78 snq=91 seq=100 bps=19000 pps=1200")
        .set_value("/tuner1/lineup", "13 13.1 WNET\n7 none\n");

    let client = client_for(&device, Duration::from_secs(1));
    let devices = local_device(2);
    let tuner = devices.tuner(1).unwrap();
    let state = client.get_tuner_state(tuner).await.unwrap();

    assert_eq!(state.channel_number, Some(13));
    assert_eq!(state.channel_info.as_ref().map(|c| c.program.as_str()), Some("13.1"));
    assert_eq!(state.status.ss, 78);
    assert_eq!(state.status.snq, 91);
    assert_eq!(state.lineup.len(), 2);
    assert_eq!(device.connections(), 4, "Each query uses its own connection");
}

#[tokio::test]
async fn test_get_tuner_state_fails_when_any_query_fails() {
    let device = MockDevice::start().await;
    device
        .set_value("/tuner0/streaminfo", "none")
        .set_value("/tuner0/status", "ch=none lock=none")
        .set_value("/tuner0/lineup", "")
        .set_error("/tuner0/channel", "ERROR: tuner locked");

    let client = client_for(&device, Duration::from_secs(1));
    let result = client.get_tuner_state(local_device(1).tuner(0).unwrap()).await;

    assert!(matches!(result, Err(ApiError::Rejected { ref name, .. }) if name == "/tuner0/channel"));
}

#[tokio::test]
async fn test_set_channel_not_in_lineup_is_still_issued() {
    let device = MockDevice::start().await;
    device.set_value("/tuner0/lineup", "13 13.1 WNET\n");

    let client = client_for(&device, Duration::from_secs(1));
    let tuner = local_device(1).tuners[0].clone();
    client.set_channel(&tuner, 99).await.unwrap();

    assert_eq!(
        device.requests(),
        vec![("/tuner0/channel".to_string(), Some("auto:99".to_string()))]
    );
    assert_eq!(client.get_channel(&tuner).await.unwrap(), Some(99));
}

#[tokio::test]
async fn test_set_channel_rejected() {
    let device = MockDevice::start().await;
    device.reject_sets("ERROR: invalid channel");

    let client = client_for(&device, Duration::from_secs(1));
    let tuner = local_device(1).tuners[0].clone();
    let result = client.set_channel(&tuner, 13).await;

    assert_eq!(result, Err(ApiError::ChannelSet("ERROR: invalid channel".to_string())));
}

#[tokio::test]
async fn test_set_channel_unacknowledged() {
    let device = MockDevice::start().await;
    device.set_delay("/tuner0/channel", Duration::from_secs(5));

    let client = client_for(&device, Duration::from_millis(100));
    let tuner = local_device(1).tuners[0].clone();
    let result = client.set_channel(&tuner, 13).await;

    assert!(matches!(result, Err(ApiError::ChannelSet(_))));
}

#[tokio::test]
async fn test_set_channel_closed_without_reply() {
    let device = MockDevice::start().await;
    device.hang_up("/tuner0/channel");

    let client = client_for(&device, Duration::from_secs(1));
    let tuner = local_device(1).tuners[0].clone();
    let result = client.set_channel(&tuner, 13).await;

    assert!(matches!(result, Err(ApiError::ChannelSet(ref message)) if message.contains("early eof")));
    assert_eq!(device.requests().len(), 1);
}

#[tokio::test]
async fn test_set_channel_refused_connection() {
    let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = HdhrClient::with_config(ClientConfig {
        port,
        request_timeout: Duration::from_millis(500),
        ..ClientConfig::default()
    });
    let tuner = local_device(1).tuners[0].clone();
    let result = client.set_channel(&tuner, 13).await;

    assert!(matches!(result, Err(ApiError::ChannelSet(_))));
}

#[tokio::test]
async fn test_timeout_retries_once() {
    let device = MockDevice::start().await;
    device
        .set_value("/tuner0/status", "ss=50")
        .set_delay("/tuner0/status", Duration::from_secs(5));

    let client = client_for(&device, Duration::from_millis(100));
    let tuner = local_device(1).tuners[0].clone();
    let result = client.get_status(&tuner).await;

    assert!(matches!(result, Err(ApiError::Timeout { .. })));
    assert_eq!(device.connections(), 2, "Expected the initial attempt plus one retry");
}

#[tokio::test]
async fn test_dropped_request_releases_connection() {
    let device = MockDevice::start().await;
    device
        .set_value("/tuner0/status", "ss=50")
        .set_delay("/tuner0/status", Duration::from_secs(5));

    let client = client_for(&device, Duration::from_secs(10));
    let tuner = local_device(1).tuners[0].clone();

    // Abandon the request mid-flight, as a cancelled poller would.
    let abandoned = tokio::time::timeout(Duration::from_millis(100), client.get_status(&tuner)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(device.abandoned(), 1);
}

#[tokio::test]
async fn test_unreachable_device() {
    // Reserve a port, then free it so nothing is listening
    let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = HdhrClient::with_config(ClientConfig {
        port,
        request_timeout: Duration::from_millis(500),
        ..ClientConfig::default()
    });
    let result = client.get(Ipv4Addr::LOCALHOST, "/sys/model").await;

    assert!(matches!(result, Err(ApiError::DeviceUnreachable(_))));
}

#[tokio::test]
async fn test_malformed_status_is_parse_error() {
    let device = MockDevice::start().await;
    device.set_value("/tuner0/status", "ch=auto:13 ss=strong");

    let client = client_for(&device, Duration::from_secs(1));
    let result = client.get_status(&local_device(1).tuners[0]).await;

    assert!(matches!(result, Err(ApiError::ProtocolParse(_))));
}
