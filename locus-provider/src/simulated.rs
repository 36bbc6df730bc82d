//! In-process provider and permission gate for tests and demos.
//!
//! `SimulatedProvider` implements every provider trait against shared state
//! that tests can script and inspect: events are pushed by hand, floor plan
//! fetches can be held open to exercise cancellation, and every session
//! start/stop is counted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::client::{
    EventSink, LocationClient, PermissionCallback, PermissionGate, ProviderClients,
    ProviderFactory, ResourceClient,
};
use crate::error::{ProviderError, Result};
use crate::types::{
    Capability, Credentials, ExplicitPosition, FloorPlan, LatLng, Location, PermissionGrant,
    RegionEvent,
};

struct SimState {
    sink: Mutex<Option<EventSink>>,
    credentials: Mutex<Vec<Credentials>>,
    reject_credentials: AtomicBool,
    start_failure: Mutex<Option<String>>,
    start_count: AtomicUsize,
    stop_count: AtomicUsize,
    destroyed: AtomicBool,
    positions: Mutex<Vec<ExplicitPosition>>,
    floor_plans: Mutex<HashMap<String, FloorPlan>>,
    fetch_error: Mutex<Option<String>>,
    fetch_hold: watch::Sender<bool>,
    started_fetches: Mutex<Vec<String>>,
    cancelled_fetches: AtomicUsize,
}

/// Scriptable positioning provider.
///
/// Clones share state, so a test can keep one clone for inspection while the
/// broker owns the clients produced by [`ProviderFactory::create`].
#[derive(Clone)]
pub struct SimulatedProvider {
    state: Arc<SimState>,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProvider {
    pub fn new() -> Self {
        let (fetch_hold, _) = watch::channel(false);
        Self {
            state: Arc::new(SimState {
                sink: Mutex::new(None),
                credentials: Mutex::new(Vec::new()),
                reject_credentials: AtomicBool::new(false),
                start_failure: Mutex::new(None),
                start_count: AtomicUsize::new(0),
                stop_count: AtomicUsize::new(0),
                destroyed: AtomicBool::new(false),
                positions: Mutex::new(Vec::new()),
                floor_plans: Mutex::new(HashMap::new()),
                fetch_error: Mutex::new(None),
                fetch_hold,
                started_fetches: Mutex::new(Vec::new()),
                cancelled_fetches: AtomicUsize::new(0),
            }),
        }
    }

    /// Publish a floor plan that fetches can find.
    pub fn with_floor_plan(self, floor_plan: FloorPlan) -> Self {
        self.insert_floor_plan(floor_plan);
        self
    }

    pub fn insert_floor_plan(&self, floor_plan: FloorPlan) {
        self.state
            .floor_plans
            .lock()
            .insert(floor_plan.id.clone(), floor_plan);
    }

    /// Make client construction fail.
    pub fn set_reject_credentials(&self, reject: bool) {
        self.state.reject_credentials.store(reject, Ordering::SeqCst);
    }

    /// Make the next session starts fail with `reason`.
    pub fn set_start_failure(&self, reason: Option<&str>) {
        *self.state.start_failure.lock() = reason.map(str::to_string);
    }

    /// Make fetches fail with a provider error instead of resolving.
    pub fn set_fetch_error(&self, reason: Option<&str>) {
        *self.state.fetch_error.lock() = reason.map(str::to_string);
    }

    /// Keep fetches pending until [`release_fetches`](Self::release_fetches).
    pub fn hold_fetches(&self) {
        self.state.fetch_hold.send_replace(true);
    }

    pub fn release_fetches(&self) {
        self.state.fetch_hold.send_replace(false);
    }

    /// Push a location through the active session. `false` if no session is running.
    pub fn emit_location(&self, location: Location) -> bool {
        match self.state.sink.lock().as_ref() {
            Some(sink) => sink.location(location),
            None => false,
        }
    }

    pub fn emit_region(&self, event: RegionEvent) -> bool {
        match self.state.sink.lock().as_ref() {
            Some(sink) => sink.region(event),
            None => false,
        }
    }

    /// Report a fatal session error and forget the sink.
    pub fn fail_session(&self, reason: &str) -> bool {
        match self.state.sink.lock().take() {
            Some(sink) => sink.session_failed(reason),
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.sink.lock().is_some()
    }

    pub fn start_count(&self) -> usize {
        self.state.start_count.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.state.stop_count.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    pub fn credentials_seen(&self) -> Vec<Credentials> {
        self.state.credentials.lock().clone()
    }

    pub fn explicit_positions(&self) -> Vec<ExplicitPosition> {
        self.state.positions.lock().clone()
    }

    /// Floor plan ids in the order their fetches began.
    pub fn started_fetches(&self) -> Vec<String> {
        self.state.started_fetches.lock().clone()
    }

    /// Number of fetches dropped before they produced a result.
    pub fn cancelled_fetches(&self) -> usize {
        self.state.cancelled_fetches.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for SimulatedProvider {
    fn create(&self, credentials: &Credentials) -> Result<ProviderClients> {
        self.state.credentials.lock().push(credentials.clone());

        if self.state.reject_credentials.load(Ordering::SeqCst) {
            return Err(ProviderError::ClientCreation(format!(
                "credentials rejected for key {}",
                credentials.api_key
            )));
        }

        Ok(ProviderClients {
            location: Arc::new(self.clone()),
            resources: Arc::new(self.clone()),
        })
    }
}

impl LocationClient for SimulatedProvider {
    fn request_updates(&self, sink: EventSink) -> Result<()> {
        if self.is_destroyed() {
            return Err(ProviderError::Destroyed);
        }
        if let Some(reason) = self.state.start_failure.lock().clone() {
            return Err(ProviderError::Session(reason));
        }

        self.state.start_count.fetch_add(1, Ordering::SeqCst);
        *self.state.sink.lock() = Some(sink);
        tracing::debug!("simulated session started");
        Ok(())
    }

    fn remove_updates(&self) -> Result<()> {
        self.state.stop_count.fetch_add(1, Ordering::SeqCst);
        self.state.sink.lock().take();
        tracing::debug!("simulated session stopped");
        Ok(())
    }

    fn set_position(&self, position: &ExplicitPosition) -> Result<()> {
        if self.is_destroyed() {
            return Err(ProviderError::Destroyed);
        }
        self.state.positions.lock().push(position.clone());
        Ok(())
    }

    fn destroy(&self) {
        self.state.destroyed.store(true, Ordering::SeqCst);
        self.state.sink.lock().take();
    }
}

/// Counts a fetch as cancelled if its future is dropped early.
struct FetchGuard<'a> {
    state: &'a SimState,
    finished: bool,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.cancelled_fetches.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ResourceClient for SimulatedProvider {
    async fn fetch_floor_plan(&self, floor_plan_id: &str) -> Result<Option<FloorPlan>> {
        self.state
            .started_fetches
            .lock()
            .push(floor_plan_id.to_string());

        let mut guard = FetchGuard {
            state: &self.state,
            finished: false,
        };

        let mut hold = self.state.fetch_hold.subscribe();
        // The sender lives in the shared state, so this only errors if the state is gone.
        let _ = hold.wait_for(|held| !*held).await;

        guard.finished = true;

        if let Some(reason) = self.state.fetch_error.lock().clone() {
            return Err(ProviderError::Fetch(reason));
        }

        Ok(self.state.floor_plans.lock().get(floor_plan_id).cloned())
    }
}

/// A plausible floor plan for `id`, handy for scripting fetch results.
pub fn sample_floor_plan(id: &str) -> FloorPlan {
    FloorPlan {
        id: id.to_string(),
        name: format!("Floor plan {id}"),
        url: format!("https://floorplans.invalid/{id}.png"),
        floor_level: 1,
        bearing: 90.0,
        bitmap_width: 2048,
        bitmap_height: 1024,
        width_meters: 64.0,
        height_meters: 32.0,
        meters_to_pixels: 32.0,
        pixels_to_meters: 0.03125,
        bottom_left: LatLng::new(60.0, 24.0),
        center: LatLng::new(60.5, 24.5),
        top_left: LatLng::new(61.0, 24.0),
        top_right: LatLng::new(61.0, 25.0),
    }
}

/// Permission gate whose prompts are answered by the test.
pub struct SimulatedPermissionGate {
    granted: AtomicBool,
    pending: Mutex<Vec<(Vec<Capability>, PermissionCallback)>>,
    request_count: AtomicUsize,
}

impl SimulatedPermissionGate {
    /// `granted` is what the synchronous check reports.
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            pending: Mutex::new(Vec::new()),
            request_count: AtomicUsize::new(0),
        }
    }

    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn pending_prompts(&self) -> usize {
        self.pending.lock().len()
    }

    /// Answer every open prompt. When `grant` is false the first capability
    /// of each prompt is denied. Returns how many prompts were answered.
    pub fn answer_all(&self, grant: bool) -> usize {
        let pending: Vec<_> = self.pending.lock().drain(..).collect();
        let answered = pending.len();

        for (capabilities, callback) in pending {
            let grants = capabilities
                .iter()
                .enumerate()
                .map(|(i, capability)| {
                    if grant || i > 0 {
                        PermissionGrant::granted(*capability)
                    } else {
                        PermissionGrant::denied(*capability)
                    }
                })
                .collect();
            callback.complete(grants);
        }

        answered
    }
}

impl PermissionGate for SimulatedPermissionGate {
    fn has_permissions(&self, _capabilities: &[Capability]) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    fn request_permissions(&self, capabilities: &[Capability], callback: PermissionCallback) {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().push((capabilities.to_vec(), callback));
    }
}
