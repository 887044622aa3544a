#![allow(clippy::unwrap_used)]
// Integration tests for `DeviceClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use exhaust_api::{DeviceClient, Error, PowerState, TransportConfig, pulse_time_values};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, DeviceClient, String) {
    let server = MockServer::start().await;
    let client = DeviceClient::new(TransportConfig {
        timeout: Duration::from_millis(500),
        ..TransportConfig::default()
    })
    .unwrap();
    let host = server.address().to_string();
    (server, client, host)
}

// ── Command tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_status_round_trip() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .and(path("/cm"))
        .and(query_param("cmnd", "Status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "Status": { "DeviceName": "A_14", "Power": "0000" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let status = client.status(&host).await.unwrap();
    assert_eq!(status["Status"]["DeviceName"], "A_14");
}

#[tokio::test]
async fn test_power_command_encodes_relay_and_state() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .and(path("/cm"))
        .and(query_param("cmnd", "Power3 On"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "POWER3": "ON" })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client.power(&host, 3, PowerState::On).await.unwrap();
    assert_eq!(resp["POWER3"], "ON");
}

#[tokio::test]
async fn test_pulse_time_read_and_set() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .and(query_param("cmnd", "PulseTime"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "PulseTime": { "Set": [5, 0, 5, 5], "Remaining": [0, 0, 0, 0] } })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("cmnd", "PulseTime2 5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "PulseTime2": { "Set": 5 } })))
        .expect(1)
        .mount(&server)
        .await;

    let current = client.pulse_time(&host).await.unwrap();
    assert_eq!(pulse_time_values(&current), vec![Some(5), Some(0), Some(5), Some(5)]);
    assert_ok!(client.set_pulse_time(&host, 2, 5).await);
}

#[tokio::test]
async fn test_send_raw_keeps_caller_encoding() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .and(path("/cm"))
        .and(query_param("cmnd", "Backlog Power1 Off;PulseTime1 5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "POWER1": "OFF" })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client
        .send_raw(&host, "Backlog%20Power1%20Off%3BPulseTime1%205")
        .await
        .unwrap();
    assert_eq!(resp["POWER1"], "OFF");
}

// ── Failure tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_non_success_status_is_reported() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client.status(&host).await.unwrap_err();
    assert!(
        matches!(err, Error::Status { status: 500, .. }),
        "expected Status error, got: {err:?}"
    );
    assert!(err.is_transient());
    assert_eq!(err.status_code(), Some(500));
}

#[tokio::test]
async fn test_slow_module_times_out() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client.status(&host).await.unwrap_err();
    assert!(
        matches!(err, Error::Timeout { .. }),
        "expected Timeout error, got: {err:?}"
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_invalid_json_is_deserialization_error() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let err = client.status(&host).await.unwrap_err();
    assert!(
        matches!(err, Error::Deserialization { .. }),
        "expected Deserialization error, got: {err:?}"
    );
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_unreachable_module_is_transient() {
    let client = DeviceClient::new(TransportConfig {
        timeout: Duration::from_millis(300),
        ..TransportConfig::default()
    })
    .unwrap();

    // Port 9 (discard) on loopback is closed in test environments.
    let err = client.status("127.0.0.1:9").await.unwrap_err();
    assert!(err.is_transient(), "expected transient error, got: {err:?}");
}
