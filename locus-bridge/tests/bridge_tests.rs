//! End-to-end tests for the sync plugin bridge against the simulated provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use locus_bridge::{BrokerConfig, CallbackId, ErrorKind, PluginResult, PositioningBridge, ResultStatus};
use locus_provider::simulated::{sample_floor_plan, SimulatedPermissionGate, SimulatedProvider};
use locus_provider::Location;
use serde_json::json;

const WAIT: Duration = Duration::from_secs(1);

struct Harness {
    bridge: PositioningBridge,
    provider: SimulatedProvider,
    gate: Arc<SimulatedPermissionGate>,
}

impl Harness {
    fn new() -> Self {
        Self::with(BrokerConfig::default(), SimulatedProvider::new(), true)
    }

    fn with(config: BrokerConfig, provider: SimulatedProvider, granted: bool) -> Self {
        let gate = Arc::new(SimulatedPermissionGate::new(granted));
        let bridge =
            PositioningBridge::with_config(config, Arc::new(provider.clone()), gate.clone())
                .expect("bridge should start");
        Self {
            bridge,
            provider,
            gate,
        }
    }

    fn initialize(&self) {
        let id = self
            .bridge
            .execute("initialize", r#"["test-key", "test-secret"]"#)
            .unwrap();
        let result = self.next_for(id);
        assert_eq!(result.status, ResultStatus::Ok, "initialize failed: {:?}", result);
    }

    fn next_for(&self, id: CallbackId) -> PluginResult {
        self.bridge
            .iter()
            .recv_for(id, WAIT)
            .unwrap_or_else(|| panic!("timed out waiting for a result for {}", id))
    }

    /// Every result that arrives within a short window, grouped by callback.
    fn collect(&self) -> HashMap<CallbackId, Vec<PluginResult>> {
        let mut grouped: HashMap<_, Vec<_>> = HashMap::new();
        let iter = self.bridge.iter();
        while let Some(result) = iter.recv_timeout(Duration::from_millis(100)) {
            grouped.entry(result.callback_id).or_default().push(result);
        }
        grouped
    }
}

fn fix(latitude: f64) -> Location {
    Location::new(latitude, 24.9, 3.0).with_floor(2, 0.9)
}

#[test]
fn test_watch_results_keep_callback_until_cleared() {
    let harness = Harness::new();
    harness.initialize();

    let watch = harness.bridge.execute("addWatch", r#"["lobby"]"#).unwrap();
    harness.bridge.stats().unwrap();
    assert!(harness.provider.is_running());

    assert!(harness.provider.emit_location(fix(60.1)));
    let first = harness.next_for(watch);
    assert_eq!(first.status, ResultStatus::Ok);
    assert!(first.keep_callback);
    assert_eq!(first.payload.as_ref().unwrap()["latitude"], 60.1);
    assert_eq!(first.payload.as_ref().unwrap()["floorLevel"], 2);

    assert!(harness.provider.emit_location(fix(60.2)));
    assert_eq!(harness.next_for(watch).payload.unwrap()["latitude"], 60.2);

    let clear = harness.bridge.execute("clearWatch", r#"["lobby"]"#).unwrap();
    let cleared = harness.next_for(clear);
    assert_eq!(cleared.status, ResultStatus::Ok);
    assert!(!cleared.keep_callback);

    let stats = harness.bridge.stats().unwrap();
    assert_eq!(stats.registered(), 0);
    assert!(!stats.session_running);
    assert_eq!(harness.provider.stop_count(), 1);
}

#[test]
fn test_watch_results_end_with_session_failure() {
    let harness = Harness::new();
    harness.initialize();

    let once = harness.bridge.execute("getLocation", "[]").unwrap();
    let watch = harness.bridge.execute("addWatch", r#"["lobby"]"#).unwrap();
    harness.bridge.stats().unwrap();

    harness.provider.emit_location(fix(60.1));
    harness.provider.emit_location(fix(60.2));
    harness.provider.fail_session("radio off");

    let statuses: Vec<_> = harness
        .bridge
        .iter()
        .results_for(watch, WAIT)
        .map(|result| (result.status, result.keep_callback))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (ResultStatus::Ok, true),
            (ResultStatus::Ok, true),
            (ResultStatus::Error, false),
        ]
    );

    // The one-shot's answer was parked while the watch was drained.
    let answer = harness.next_for(once);
    assert_eq!(answer.payload.unwrap()["latitude"], 60.1);
}

#[test]
fn test_get_location_serializes_as_plugin_result() {
    let harness = Harness::new();
    harness.initialize();

    let once = harness.bridge.execute("getLocation", "[]").unwrap();
    harness.bridge.stats().unwrap();
    harness.provider.emit_location(fix(60.3));

    let result = harness.next_for(once);
    assert!(!result.keep_callback);

    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(json["callbackId"], once.to_string());
    assert_eq!(json["status"], "ok");
    assert_eq!(json["keepCallback"], false);
    assert_eq!(json["payload"]["latitude"], 60.3);
}

#[test]
fn test_argument_errors_arrive_as_results() {
    let harness = Harness::new();

    let not_initialized = harness.bridge.execute("addWatch", r#"["w"]"#).unwrap();
    let unknown = harness.bridge.execute("teleport", "").unwrap();
    let bad_timeout = harness.bridge.execute("getLocation", "[-5]").unwrap();

    let results = harness.collect();
    let code = |id: &CallbackId| results[id][0].error_code();

    assert_eq!(code(&not_initialized), Some(u64::from(ErrorKind::NotInitialized.code())));
    assert_eq!(code(&unknown), Some(u64::from(ErrorKind::InvalidArguments.code())));
    assert_eq!(code(&bad_timeout), Some(u64::from(ErrorKind::InvalidArguments.code())));
    assert_eq!(
        results[&unknown][0].payload.as_ref().unwrap()["message"],
        "Unknown action: teleport"
    );
}

#[test]
fn test_request_timeout_reports_error_once() {
    let harness = Harness::new();
    harness.initialize();

    let watch = harness.bridge.execute("addWatch", r#"["w", 50]"#).unwrap();

    let result = harness.next_for(watch);
    assert_eq!(result.status, ResultStatus::Error);
    assert_eq!(result.error_code(), Some(u64::from(ErrorKind::Timeout.code())));

    assert!(harness.collect().get(&watch).is_none());
    let stats = harness.bridge.stats().unwrap();
    assert_eq!(stats.registered(), 0);
    assert_eq!(stats.scheduled_timeouts, 0);
}

#[test]
fn test_fetch_and_set_position() {
    let provider = SimulatedProvider::new().with_floor_plan(sample_floor_plan("fp-1"));
    let harness = Harness::with(BrokerConfig::default(), provider, true);
    harness.initialize();

    let fetch = harness.bridge.execute("fetchFloorPlan", r#"["fp-1"]"#).unwrap();
    let plan = harness.next_for(fetch);
    assert_eq!(plan.status, ResultStatus::Ok);
    assert_eq!(plan.payload.as_ref().unwrap()["id"], "fp-1");
    assert_eq!(plan.payload.as_ref().unwrap()["bottomLeft"], json!([24.0, 60.0]));

    let position = harness
        .bridge
        .execute("setPosition", r#"["", [60.5, 24.5]]"#)
        .unwrap();
    assert_eq!(harness.next_for(position).status, ResultStatus::Ok);
    assert_eq!(harness.provider.explicit_positions().len(), 1);
}

#[test]
fn test_shutdown_resolves_in_flight_fetch_with_no_result() {
    let provider = SimulatedProvider::new().with_floor_plan(sample_floor_plan("fp-1"));
    provider.hold_fetches();
    let harness = Harness::with(BrokerConfig::default(), provider, true);
    harness.initialize();

    let watch = harness.bridge.execute("addWatch", r#"["w"]"#).unwrap();
    let fetch = harness.bridge.execute("fetchFloorPlan", r#"["fp-1"]"#).unwrap();
    assert!(harness.bridge.stats().unwrap().fetch_in_flight);

    harness.bridge.shutdown().unwrap();
    assert!(!harness.bridge.is_running());

    let results = harness.collect();
    assert_eq!(results[&fetch].len(), 1);
    assert_eq!(results[&fetch][0].status, ResultStatus::NoResult);
    assert!(results.get(&watch).is_none());
    assert!(harness.provider.is_destroyed());
}

#[test]
fn test_deferred_permission_prompt() {
    let harness = Harness::with(BrokerConfig::default(), SimulatedProvider::new(), false);

    let prompt = harness.bridge.execute("getPermissions", "[]").unwrap();
    assert_eq!(harness.bridge.stats().unwrap().pending_permission_prompts, 1);
    assert_eq!(harness.gate.pending_prompts(), 1);

    assert_eq!(harness.gate.answer_all(false), 1);
    let result = harness.next_for(prompt);
    assert_eq!(
        result.error_code(),
        Some(u64::from(ErrorKind::PermissionDenied.code()))
    );
}

#[test]
fn test_dropping_bridge_destroys_provider() {
    let harness = Harness::new();
    harness.initialize();
    let provider = harness.provider.clone();
    let iter = harness.bridge.iter();

    drop(harness);

    // The worker exits once teardown finishes, closing the result queue.
    assert!(iter.recv_timeout(WAIT).is_none());
    assert!(provider.is_destroyed());
}
