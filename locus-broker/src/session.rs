//! Provider session state.

use locus_provider::{EventSink, LocationClient};
use tracing::{info, warn};

/// Tracks whether the provider is currently delivering updates, so the
/// session is started and stopped exactly once per transition.
#[derive(Debug, Default)]
pub struct Session {
    running: bool,
    starts: u64,
    stops: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start the session unless it already runs.
    ///
    /// Returns `Ok(true)` if this call started it.
    pub fn start(
        &mut self,
        client: &dyn LocationClient,
        sink: EventSink,
    ) -> locus_provider::Result<bool> {
        if self.running {
            return Ok(false);
        }
        client.request_updates(sink)?;
        self.running = true;
        self.starts += 1;
        info!("positioning session started");
        Ok(true)
    }

    /// Stop the session if it runs. Returns `true` if this call stopped it.
    pub fn stop(&mut self, client: &dyn LocationClient) -> bool {
        if !self.running {
            return false;
        }
        if let Err(e) = client.remove_updates() {
            warn!(error = %e, "provider failed to stop updates cleanly");
        }
        self.running = false;
        self.stops += 1;
        info!("positioning session stopped");
        true
    }

    /// Record that the provider ended the session on its own.
    pub fn mark_stopped(&mut self) {
        if self.running {
            self.running = false;
            self.stops += 1;
        }
    }

    pub fn start_count(&self) -> u64 {
        self.starts
    }

    pub fn stop_count(&self) -> u64 {
        self.stops
    }
}
