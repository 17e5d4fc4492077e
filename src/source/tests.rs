//! Tests for the source module

use super::*;
use crate::auth::StaticTokenProvider;
use crate::config::SourceConfig;
use crate::error::{Error, ErrorKind};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use test_case::test_case;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn signin(uuid: &str, ts: &str) -> serde_json::Value {
    json!({
        "uuid": uuid,
        "session_uuid": "S1",
        "timestamp": ts,
        "country": "CA",
        "category": "success",
        "type": "credentials_ok",
        "details": null,
        "target_user": {"uuid": "U1", "name": "Ada", "email": "ada@example.com"},
        "client": {
            "app_name": "1Password Browser Extension",
            "app_version": "20240",
            "platform_name": "Chrome",
            "platform_version": "120",
            "os_name": "MacOSX",
            "os_version": "14.2",
            "ip_address": "192.0.2.10"
        },
        "location": {
            "country": "CA",
            "region": "Ontario",
            "city": "Toronto",
            "latitude": 43.6,
            "longitude": -79.4
        }
    })
}

async fn client_for(server: &MockServer) -> EventsApiClient {
    let config = SourceConfig {
        base_url: server.uri(),
        page_limit: 1000,
        ..SourceConfig::default()
    };
    EventsApiClient::from_config(
        &config,
        "/api/v1/signinattempts",
        Arc::new(StaticTokenProvider::new("tkn")),
    )
    .unwrap()
}

// ============================================================================
// Seed Tests
// ============================================================================

#[test]
fn test_seed_not_found_is_lookback_window() {
    let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    let seed = Seed::resolve(None, now, Duration::hours(24));
    assert_eq!(
        seed,
        Seed::StartTime(Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap())
    );
}

#[test_case("" ; "empty")]
#[test_case("   " ; "blank")]
#[test_case("first_run" ; "sentinel")]
fn test_seed_sentinel_is_first_run(stored: &str) {
    let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    let seed = Seed::resolve(Some(Cursor::new(stored)), now, Duration::hours(6));
    assert_eq!(seed, Seed::StartTime(now - Duration::hours(6)));
}

#[test]
fn test_seed_uses_stored_cursor_verbatim() {
    let now = Utc::now();
    let seed = Seed::resolve(Some(Cursor::new("aGVsbG8=")), now, Duration::hours(24));
    assert_eq!(seed, Seed::Cursor(Cursor::new("aGVsbG8=")));
}

#[test]
fn test_request_body_carries_one_of_cursor_or_start_time() {
    let start = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
    assert_eq!(
        Seed::StartTime(start).request_body(500),
        json!({"limit": 500, "start_time": "2024-03-09T12:00:00Z"})
    );
    assert_eq!(
        Seed::Cursor(Cursor::new("c1")).request_body(500),
        json!({"cursor": "c1"})
    );
}

// ============================================================================
// Event Model Tests
// ============================================================================

#[test]
fn test_event_interprets_id_and_time() {
    let event: Event = serde_json::from_value(signin("E1", "2024-03-09T12:34:56Z")).unwrap();

    assert_eq!(event.uuid(), "E1");
    assert_eq!(event.timestamp().timestamp(), 1_709_987_696);
    assert_eq!(event.payload()["client"]["os_name"], "MacOSX");
}

#[test]
fn test_event_forwards_payload_verbatim() {
    let raw = json!({
        "uuid": "E2",
        "timestamp": "2024-03-09T12:00:00.123Z",
        "used_version": 3,
        "vault_uuid": "V1",
        "target_user": {"uuid": "T1", "name": null, "email": "a@b", "type": "member"},
        "location": {"city": null, "latitude": null}
    });
    let event: Event = serde_json::from_value(raw.clone()).unwrap();

    assert_eq!(event.timestamp().timestamp_subsec_millis(), 123);
    // Nulls, nested unknown keys and absent fields come out as they went in
    assert_eq!(serde_json::to_value(&event).unwrap(), raw);
}

#[test]
fn test_event_tolerates_missing_uuid() {
    let event: Event = serde_json::from_value(json!({
        "uuid": null,
        "timestamp": "2024-03-09T12:00:00Z"
    }))
    .unwrap();
    assert_eq!(event.uuid(), "");
}

#[tokio::test]
async fn test_page_with_null_nested_fields_decodes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cursor": "c9",
            "has_more": false,
            "items": [
                {
                    "uuid": "u1",
                    "timestamp": "2024-03-10T11:00:00Z",
                    "target_user": {"uuid": "t", "name": null, "email": "a@b"},
                    "client": null
                },
                signin("u2", "2024-03-10T11:01:00Z")
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let page = client
        .fetch_page(&Seed::Cursor(Cursor::new("c8")))
        .await
        .unwrap();

    assert_eq!(page.len(), 2);
    assert_eq!(page.events[0].payload()["target_user"]["name"], serde_json::Value::Null);
    assert_eq!(page.next_cursor, Some(Cursor::new("c9")));
}

#[test]
fn test_event_requires_timestamp() {
    let result: Result<Event, _> = serde_json::from_value(json!({"uuid": "E3"}));
    assert!(result.is_err());
}

// ============================================================================
// Client Tests
// ============================================================================

#[tokio::test]
async fn test_fetch_first_page_with_time_window() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/signinattempts"))
        .and(header("Authorization", "Bearer tkn"))
        .and(body_json(json!({"limit": 1000, "start_time": "2024-03-09T12:00:00Z"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cursor": "abc",
            "has_more": false,
            "items": [
                signin("E1", "2024-03-09T12:10:00Z"),
                signin("E2", "2024-03-09T12:11:00Z"),
                signin("E3", "2024-03-09T12:12:00Z")
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let start = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
    let page = client.fetch_page(&Seed::StartTime(start)).await.unwrap();

    assert_eq!(page.len(), 3);
    assert!(!page.has_more);
    assert_eq!(page.next_cursor, Some(Cursor::new("abc")));
    assert_eq!(page.events[2].uuid(), "E3");
}

#[tokio::test]
async fn test_fetch_with_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/signinattempts"))
        .and(body_json(json!({"cursor": "c1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cursor": "c2",
            "has_more": true,
            "items": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let page = client
        .fetch_page(&Seed::Cursor(Cursor::new("c1")))
        .await
        .unwrap();

    assert!(page.is_empty());
    assert!(page.has_more);
    assert_eq!(page.next_cursor, Some(Cursor::new("c2")));
}

#[tokio::test]
async fn test_empty_cursor_maps_to_none() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cursor": "",
            "has_more": false
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let page = client
        .fetch_page(&Seed::Cursor(Cursor::new("c1")))
        .await
        .unwrap();

    assert!(page.next_cursor.is_none());
    assert!(page.require_cursor().is_err());
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;

    // has_more missing: continuation can't be decided
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cursor": "c2",
            "items": []
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .fetch_page(&Seed::Cursor(Cursor::new("c1")))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Decode);
    match err {
        Error::Decode { payload, .. } => assert!(payload.contains("\"cursor\":\"c2\"")),
        other => panic!("Expected Decode, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_is_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .fetch_page(&Seed::Cursor(Cursor::new("c1")))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(!err.is_retryable());
}
