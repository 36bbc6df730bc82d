//! Integration tests for the locus-broker crate.
//!
//! These tests drive a spawned broker through its handle against the
//! simulated provider and cover:
//! - Watch lifecycle (add, deliver, replace, clear)
//! - One-shot location requests and the cached answer
//! - Per-request timeouts
//! - Floor plan fetch cancellation
//! - Explicit positions, permissions, session failure and shutdown


use std::time::Duration;

use locus_broker::{BrokerConfig, BrokerError, ErrorKind, Outcome};
use locus_provider::simulated::{sample_floor_plan, SimulatedProvider};
use locus_provider::{LatLng, Location, Region, RegionEvent};
use serde_json::json;
use test_helpers::{
    assert_dropped_unresolved, assert_error, assert_pending, assert_success, next_reply,
    TestBroker,
};

fn fix(latitude: f64) -> Location {
    Location::new(latitude, 24.94, 3.5).with_floor(1, 0.95)
}

// ============================================================================
// Initialization
// ============================================================================

#[tokio::test]
async fn test_commands_before_initialize_fail_without_registering() {
    let broker = TestBroker::spawn(BrokerConfig::default());

    let mut watch = broker.execute("addWatch", json!(["w"]));
    let mut region = broker.execute("addRegionWatch", json!(["r"]));
    let mut location = broker.execute("getLocation", json!([]));
    let mut position = broker.execute("setPosition", json!(["floor1", []]));
    let mut fetch = broker.execute("fetchFloorPlan", json!(["fp-1"]));
    let mut clear = broker.execute("clearWatch", json!(["w"]));

    let stats = broker.settle().await;
    for rx in [&mut watch, &mut region, &mut location, &mut position, &mut fetch] {
        assert_error(rx, ErrorKind::NotInitialized);
    }
    assert_success(&mut clear);

    assert_eq!(stats.registered(), 0);
    assert!(!stats.initialized);
    assert_eq!(broker.provider.start_count(), 0);
}

#[tokio::test]
async fn test_initialize_validates_and_is_idempotent() {
    let broker = TestBroker::spawn(BrokerConfig::default());

    let mut blank = broker.execute("initialize", json!(["  ", "secret"]));
    assert_error(&mut blank, ErrorKind::InvalidCredentials);
    assert!(broker.provider.credentials_seen().is_empty());

    broker.initialize().await;
    broker.initialize().await;

    let stats = broker.settle().await;
    assert!(stats.initialized);
    assert_eq!(broker.provider.credentials_seen().len(), 1);
    assert_eq!(broker.provider.credentials_seen()[0].api_key, "test-key");
}

#[tokio::test]
async fn test_rejected_credentials_leave_broker_uninitialized() {
    let provider = SimulatedProvider::new();
    provider.set_reject_credentials(true);
    let broker = TestBroker::spawn_with(BrokerConfig::default(), provider, true);

    let mut rx = broker.execute("initialize", json!(["key", "secret"]));
    let reply = next_reply(&mut rx).await;
    assert_eq!(reply.error_kind(), Some(ErrorKind::Unspecified));

    assert!(!broker.settle().await.initialized);
}

#[tokio::test]
async fn test_unknown_action_is_rejected() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    let mut rx = broker.execute("teleport", json!([]));

    let reply = assert_error(&mut rx, ErrorKind::InvalidArguments);
    match reply.outcome {
        Outcome::Error(error) => assert_eq!(error.message(), "Unknown action: teleport"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

// ============================================================================
// Watches
// ============================================================================

#[tokio::test]
async fn test_watch_receives_locations_until_cleared() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    broker.initialize().await;

    let mut keeper = broker.execute("addWatch", json!(["keeper"]));
    let mut watch = broker.execute("addWatch", json!(["w"]));
    broker.settle().await;
    assert!(broker.provider.is_running());

    assert!(broker.provider.emit_location(fix(60.1)));
    broker.settle().await;
    let reply = watch.try_recv().unwrap();
    assert!(reply.keep_callback);
    assert_eq!(reply.payload().unwrap()["latitude"], 60.1);
    assert!(keeper.try_recv().is_ok());

    let mut clear = broker.execute("clearWatch", json!(["w"]));
    broker.settle().await;
    assert_success(&mut clear);

    assert!(broker.provider.emit_location(fix(60.2)));
    broker.settle().await;
    assert_dropped_unresolved(&mut watch);
    assert!(keeper.try_recv().is_ok());
}

#[tokio::test]
async fn test_reused_watch_id_replaces_subscriber() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    broker.initialize().await;

    let mut first = broker.execute("addWatch", json!(["w"]));
    let mut second = broker.execute("addWatch", json!(["w"]));
    let stats = broker.settle().await;
    assert_eq!(stats.position_watches, 1);

    broker.provider.emit_location(fix(60.1));
    broker.settle().await;

    assert_dropped_unresolved(&mut first);
    assert!(second.try_recv().unwrap().keep_callback);
}

#[tokio::test]
async fn test_region_watch_receives_region_events_only() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    broker.initialize().await;

    let mut region = broker.execute("addRegionWatch", json!(["r"]));
    broker.settle().await;

    broker.provider.emit_location(fix(60.1));
    broker
        .provider
        .emit_region(RegionEvent::enter(Region::floor_plan("fp-1").with_name("Lobby")));
    broker.settle().await;

    let reply = region.try_recv().unwrap();
    assert!(reply.keep_callback);
    let payload = reply.payload().unwrap();
    assert_eq!(payload["regionId"], "fp-1");
    assert_eq!(payload["regionName"], "Lobby");
    assert_eq!(payload["regionType"], "floorPlan");
    assert_eq!(payload["transitionType"], "enter");
    assert_pending(&mut region);
}

// ============================================================================
// One-shot location
// ============================================================================

#[tokio::test]
async fn test_get_location_starts_session_and_resolves_once() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    broker.initialize().await;

    let mut rx = broker.execute("getLocation", json!([]));
    let stats = broker.settle().await;
    assert_eq!(stats.pending_one_shots, 1);
    assert!(stats.session_running);

    broker.provider.emit_location(fix(60.3));
    let stats = broker.settle().await;

    let reply = rx.try_recv().unwrap();
    assert!(!reply.keep_callback);
    assert_eq!(reply.payload().unwrap()["floorLevel"], 1);
    assert_dropped_unresolved(&mut rx);

    assert_eq!(stats.registered(), 0);
    assert!(!stats.session_running);
    assert_eq!(broker.provider.stop_count(), 1);
}

#[tokio::test]
async fn test_get_location_while_running_uses_cache() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    broker.initialize().await;

    let _watch = broker.execute("addWatch", json!(["w"]));
    broker.settle().await;

    let mut empty = broker.execute("getLocation", json!([]));
    broker.settle().await;
    assert_error(&mut empty, ErrorKind::PositionUnavailable);

    broker.provider.emit_location(fix(60.4));
    broker.settle().await;

    let mut cached = broker.execute("getLocation", json!([]));
    let stats = broker.settle().await;
    let payload = assert_success(&mut cached).unwrap();
    assert_eq!(payload["latitude"], 60.4);
    assert_eq!(stats.pending_one_shots, 0);
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_timeouts_fire_once_per_request() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    broker.initialize().await;

    let mut one_shot = broker.execute("getLocation", json!([500]));
    let mut watch = broker.execute("addWatch", json!(["w", 1000]));
    let stats = broker.settle().await;
    assert_eq!(stats.registered(), 2);
    assert_eq!(stats.scheduled_timeouts, 2);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let stats = broker.settle().await;
    assert_error(&mut one_shot, ErrorKind::Timeout);
    assert_dropped_unresolved(&mut one_shot);
    assert_pending(&mut watch);
    assert_eq!(stats.registered(), 1);
    assert!(stats.session_running);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let stats = broker.settle().await;
    assert_error(&mut watch, ErrorKind::Timeout);
    assert_dropped_unresolved(&mut watch);
    assert_eq!(stats.registered(), 0);
    assert!(!stats.session_running);
    assert_eq!(broker.provider.stop_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_first_delivery_cancels_watch_timeout() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    broker.initialize().await;

    let mut watch = broker.execute("addWatch", json!(["w", 1000]));
    broker.settle().await;
    broker.provider.emit_location(fix(60.1));
    broker.settle().await;
    assert!(watch.try_recv().is_ok());

    tokio::time::sleep(Duration::from_secs(5)).await;
    let stats = broker.settle().await;
    assert_pending(&mut watch);
    assert_eq!(stats.position_watches, 1);
    assert_eq!(stats.scheduled_timeouts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cleared_watch_never_times_out() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    broker.initialize().await;

    let mut watch = broker.execute("addWatch", json!(["w", 1000]));
    let mut clear = broker.execute("clearWatch", json!(["w"]));
    broker.settle().await;
    assert_success(&mut clear);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let stats = broker.settle().await;
    assert_dropped_unresolved(&mut watch);
    assert_eq!(stats.scheduled_timeouts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reused_watch_id_keeps_only_new_timer() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    broker.initialize().await;

    let _first = broker.execute("addWatch", json!(["w", 500]));
    let mut second = broker.execute("addWatch", json!(["w", 2000]));
    broker.settle().await;

    tokio::time::sleep(Duration::from_millis(1000)).await;
    let stats = broker.settle().await;
    assert_pending(&mut second);
    assert_eq!(stats.position_watches, 1);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    broker.settle().await;
    assert_error(&mut second, ErrorKind::Timeout);
}

#[tokio::test(start_paused = true)]
async fn test_configured_default_timeout_and_clamp() {
    let config = BrokerConfig::new()
        .with_max_timeout(Duration::from_secs(2))
        .with_default_timeout(Duration::from_secs(1));
    let broker = TestBroker::spawn(config);
    broker.initialize().await;

    let mut defaulted = broker.execute("getLocation", json!([]));
    let mut clamped = broker.execute("addWatch", json!(["w", 60_000]));
    broker.settle().await;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    broker.settle().await;
    assert_error(&mut defaulted, ErrorKind::Timeout);
    assert_pending(&mut clamped);

    tokio::time::sleep(Duration::from_secs(1)).await;
    broker.settle().await;
    assert_error(&mut clamped, ErrorKind::Timeout);
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn test_session_stops_exactly_once_when_registry_empties() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    broker.initialize().await;

    let _watch = broker.execute("addWatch", json!(["a"]));
    let _region = broker.execute("addRegionWatch", json!(["r"]));
    let _one_shot = broker.execute("getLocation", json!([]));
    broker.settle().await;

    broker.provider.emit_location(fix(60.0));
    let stats = broker.settle().await;
    assert_eq!(stats.registered(), 2);
    assert!(stats.session_running);

    let _ = broker.execute("clearWatch", json!(["a"]));
    let _ = broker.execute("clearRegionWatch", json!(["r"]));
    let _ = broker.execute("clearWatch", json!(["a"]));
    let _ = broker.execute("clearRegionWatch", json!(["never-added"]));
    let stats = broker.settle().await;

    assert!(!stats.session_running);
    assert_eq!(broker.provider.start_count(), 1);
    assert_eq!(broker.provider.stop_count(), 1);
    assert_eq!(stats.session_stops, 1);
}

#[tokio::test]
async fn test_session_start_failure_fails_request() {
    let provider = SimulatedProvider::new();
    provider.set_start_failure(Some("location services disabled"));
    let broker = TestBroker::spawn_with(BrokerConfig::default(), provider, true);
    broker.initialize().await;

    let mut watch = broker.execute("addWatch", json!(["w", 1000]));
    let stats = broker.settle().await;

    let reply = assert_error(&mut watch, ErrorKind::Unspecified);
    assert!(format!("{:?}", reply.outcome).contains("location services disabled"));
    assert_eq!(stats.registered(), 0);
    assert_eq!(stats.scheduled_timeouts, 0);
    assert!(!stats.session_running);
}

#[tokio::test]
async fn test_session_failure_fails_everyone_and_recovers() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    broker.initialize().await;

    // The one-shot goes first so it is still pending when the session fails.
    let mut one_shot = broker.execute("getLocation", json!([]));
    let mut watch = broker.execute("addWatch", json!(["w"]));
    let stats = broker.settle().await;
    assert_eq!(stats.pending_one_shots, 1);
    assert_eq!(stats.position_watches, 1);

    assert!(broker.provider.fail_session("radio off"));
    let stats = broker.settle().await;
    assert_eq!(broker.provider.stop_count(), 1);
    assert_eq!(stats.session_stops, 1);

    for rx in [&mut watch, &mut one_shot] {
        let reply = assert_error(rx, ErrorKind::Unspecified);
        match reply.outcome {
            Outcome::Error(error) => {
                assert_eq!(error.message(), "Positioning session error: radio off")
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(stats.registered(), 0);
    assert!(!stats.session_running);

    let _again = broker.execute("addWatch", json!(["w"]));
    let stats = broker.settle().await;
    assert!(stats.session_running);
    assert_eq!(broker.provider.start_count(), 2);
}

// ============================================================================
// Explicit position
// ============================================================================

#[tokio::test]
async fn test_set_position_requires_region_or_coordinate() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    broker.initialize().await;

    let mut neither = broker.execute("setPosition", json!(["", []]));
    let mut region = broker.execute("setPosition", json!(["floor1", []]));
    let mut coordinate = broker.execute("setPosition", json!(["", [1.0, 2.0]]));
    broker.settle().await;

    assert_error(&mut neither, ErrorKind::InvalidArguments);
    assert_success(&mut region);
    assert_success(&mut coordinate);

    let positions = broker.provider.explicit_positions();
    assert_eq!(positions.len(), 2);
    assert_eq!(positions[0].region_id(), Some("floor1"));
    assert_eq!(positions[0].coordinate(), None);
    assert_eq!(positions[1].region_id(), None);
    assert_eq!(positions[1].coordinate(), Some(LatLng::new(1.0, 2.0)));
}

// ============================================================================
// Floor plan fetch
// ============================================================================

#[tokio::test]
async fn test_new_fetch_cancels_previous() {
    let provider = SimulatedProvider::new().with_floor_plan(sample_floor_plan("B"));
    provider.hold_fetches();
    let broker = TestBroker::spawn_with(BrokerConfig::default(), provider, true);
    broker.initialize().await;

    let mut first = broker.execute("fetchFloorPlan", json!(["A"]));
    broker.settle().await;
    let mut second = broker.execute("fetchFloorPlan", json!(["B"]));
    broker.settle().await;

    let reply = first.try_recv().unwrap();
    assert_eq!(reply.outcome, Outcome::NoResult);
    assert_dropped_unresolved(&mut first);
    assert_pending(&mut second);

    broker.provider.release_fetches();
    let reply = next_reply(&mut second).await;
    let payload = reply.payload().unwrap();
    assert_eq!(payload["id"], "B");
    assert_eq!(payload["bottomLeft"], json!([24.0, 60.0]));
    assert_eq!(
        broker.provider.started_fetches().last().map(String::as_str),
        Some("B")
    );
    assert!(!broker.settle().await.fetch_in_flight);
}

#[tokio::test]
async fn test_fetch_of_unknown_plan_is_unavailable() {
    let broker = TestBroker::spawn(BrokerConfig::default());
    broker.initialize().await;

    let mut rx = broker.execute("fetchFloorPlan", json!(["missing"]));
    let reply = next_reply(&mut rx).await;
    assert_eq!(reply.error_kind(), Some(ErrorKind::ResourceUnavailable));

    broker.provider.set_fetch_error(Some("offline"));
    let mut rx = broker.execute("fetchFloorPlan", json!(["missing"]));
    let reply = next_reply(&mut rx).await;
    assert_eq!(reply.error_kind(), Some(ErrorKind::Unspecified));
}

// ============================================================================
// Permissions
// ============================================================================

#[tokio::test]
async fn test_granted_permissions_answer_immediately() {
    let broker = TestBroker::spawn(BrokerConfig::default());

    let mut rx = broker.execute("getPermissions", json!([]));
    broker.settle().await;
    assert_success(&mut rx);
    assert_eq!(broker.gate.request_count(), 0);
}

#[tokio::test]
async fn test_deferred_permission_prompts_resolve_independently() {
    let broker = TestBroker::spawn_with(BrokerConfig::default(), SimulatedProvider::new(), false);

    let mut first = broker.execute("getPermissions", json!([]));
    let stats = broker.settle().await;
    assert_eq!(stats.pending_permission_prompts, 1);
    assert_eq!(broker.gate.answer_all(true), 1);
    broker.settle().await;
    assert_success(&mut first);

    let mut second = broker.execute("getPermissions", json!([]));
    let mut third = broker.execute("getPermissions", json!([]));
    broker.settle().await;
    assert_eq!(broker.gate.answer_all(false), 2);
    let stats = broker.settle().await;

    assert_error(&mut second, ErrorKind::PermissionDenied);
    assert_error(&mut third, ErrorKind::PermissionDenied);
    assert_eq!(stats.pending_permission_prompts, 0);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_releases_provider() {
    let provider = SimulatedProvider::new();
    provider.hold_fetches();
    let broker = TestBroker::spawn_with(BrokerConfig::default(), provider, false);
    broker.initialize().await;

    let mut watch = broker.execute("addWatch", json!(["w"]));
    let mut fetch = broker.execute("fetchFloorPlan", json!(["A"]));
    let mut permission = broker.execute("getPermissions", json!([]));
    broker.settle().await;

    broker.handle.shutdown().await.unwrap();

    assert!(broker.provider.is_destroyed());
    assert_eq!(broker.provider.stop_count(), 1);
    assert_eq!(fetch.try_recv().unwrap().outcome, Outcome::NoResult);
    assert_dropped_unresolved(&mut watch);
    assert_dropped_unresolved(&mut permission);

    // A late platform answer after shutdown goes nowhere.
    assert_eq!(broker.gate.answer_all(true), 1);

    assert!(matches!(
        broker.handle.stats().await,
        Err(BrokerError::Stopped)
    ));
}
