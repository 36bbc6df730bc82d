//! Per-request timers.
//!
//! Each scheduled timer is a tokio task sleeping for the request's timeout.
//! Its [`AbortHandle`] is kept keyed by [`RequestId`] so resolution or clear
//! can cancel it. A timer that fires does not touch broker state itself: it
//! runs a callback that marshals the id back onto the broker loop, where
//! [`TimeoutSupervisor::complete`] decides whether the firing is still live.

use std::collections::HashMap;
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::{debug, trace};

use crate::types::RequestId;

#[derive(Default)]
pub struct TimeoutSupervisor {
    timers: HashMap<RequestId, AbortHandle>,
}

impl TimeoutSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a timer for `request_id`, replacing any timer already held for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, request_id: RequestId, timeout: Duration, on_fire: F)
    where
        F: FnOnce(RequestId) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            on_fire(request_id);
        });

        if let Some(previous) = self.timers.insert(request_id, task.abort_handle()) {
            previous.abort();
        }

        debug!(
            request_id = %request_id,
            timeout_ms = timeout.as_millis() as u64,
            "timeout scheduled"
        );
    }

    /// Cancel the timer for `request_id`, if any.
    pub fn cancel(&mut self, request_id: RequestId) -> bool {
        match self.timers.remove(&request_id) {
            Some(handle) => {
                handle.abort();
                trace!(request_id = %request_id, "timeout cancelled");
                true
            }
            None => false,
        }
    }

    /// Record that the timer for `request_id` fired.
    ///
    /// Returns `false` when no timer is held for the id, meaning the request
    /// was resolved or cleared after the sleep finished and the firing must
    /// be ignored.
    pub fn complete(&mut self, request_id: RequestId) -> bool {
        self.timers.remove(&request_id).is_some()
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }

    pub fn is_scheduled(&self, request_id: RequestId) -> bool {
        self.timers.contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Drop for TimeoutSupervisor {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
