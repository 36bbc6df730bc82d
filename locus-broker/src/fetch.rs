//! At most one in-flight floor plan fetch.

use std::sync::Arc;

use locus_provider::{FloorPlan, ResourceClient};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::error::{ErrorKind, PositionError};
use crate::subscriber::Subscriber;
use crate::types::FetchId;

struct ActiveFetch {
    fetch_id: FetchId,
    floor_plan_id: String,
    abort: AbortHandle,
    subscriber: Subscriber,
}

/// Owns the single active fetch.
///
/// Starting a fetch cancels the previous one first: its task is aborted,
/// which drops the provider future, and its subscriber resolves with
/// "no result" before the new fetch is spawned.
#[derive(Default)]
pub struct FetchCanceller {
    active: Option<ActiveFetch>,
    next_id: u64,
}

impl FetchCanceller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start fetching `floor_plan_id`. `on_complete` runs on the fetch task
    /// with the provider's answer and must route it back to [`complete`](Self::complete).
    pub fn start<F>(
        &mut self,
        floor_plan_id: impl Into<String>,
        subscriber: Subscriber,
        resources: Arc<dyn ResourceClient>,
        on_complete: F,
    ) -> FetchId
    where
        F: FnOnce(FetchId, locus_provider::Result<Option<FloorPlan>>) + Send + 'static,
    {
        self.cancel();

        self.next_id += 1;
        let fetch_id = FetchId::new(self.next_id);
        let floor_plan_id = floor_plan_id.into();

        let task_id = floor_plan_id.clone();
        let task = tokio::spawn(async move {
            let result = resources.fetch_floor_plan(&task_id).await;
            on_complete(fetch_id, result);
        });

        debug!(fetch_id = %fetch_id, floor_plan_id = %floor_plan_id, "floor plan fetch started");
        self.active = Some(ActiveFetch {
            fetch_id,
            floor_plan_id,
            abort: task.abort_handle(),
            subscriber,
        });
        fetch_id
    }

    /// Abort the active fetch and resolve its subscriber with no result.
    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        active.abort.abort();
        debug!(
            fetch_id = %active.fetch_id,
            floor_plan_id = %active.floor_plan_id,
            "floor plan fetch cancelled"
        );
        active.subscriber.no_result();
        true
    }

    /// Resolve the active fetch with the provider's answer.
    ///
    /// Returns `false` and does nothing when `fetch_id` is not the active fetch.
    pub fn complete(
        &mut self,
        fetch_id: FetchId,
        result: locus_provider::Result<Option<FloorPlan>>,
    ) -> bool {
        let is_current = matches!(&self.active, Some(active) if active.fetch_id == fetch_id);
        if !is_current {
            warn!(fetch_id = %fetch_id, "ignoring completion for stale fetch");
            return false;
        }
        let Some(active) = self.active.take() else {
            return false;
        };

        match result {
            Ok(Some(floor_plan)) => match serde_json::to_value(&floor_plan) {
                Ok(payload) => active.subscriber.succeed(Some(payload)),
                Err(e) => active.subscriber.fail(PositionError::unspecified(e.to_string())),
            },
            Ok(None) => {
                debug!(floor_plan_id = %active.floor_plan_id, "floor plan not found");
                active
                    .subscriber
                    .fail(PositionError::new(ErrorKind::ResourceUnavailable));
            }
            Err(e) => {
                warn!(floor_plan_id = %active.floor_plan_id, error = %e, "floor plan fetch failed");
                active.subscriber.fail(e.into());
            }
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_floor_plan(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.floor_plan_id.as_str())
    }
}
