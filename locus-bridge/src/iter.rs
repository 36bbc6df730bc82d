//! Blocking access to plugin results
//!
//! Results for every callback arrive on one queue. A host usually waits on a
//! single callback at a time, so results for other callbacks that turn up in
//! the meantime are parked and handed out later in arrival order.

use std::collections::VecDeque;
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use locus_broker::CallbackId;

use crate::result::PluginResult;

/// Queue shared by the bridge and all of its iterators.
pub(crate) struct Inbox {
    rx: mpsc::Receiver<PluginResult>,
    parked: VecDeque<PluginResult>,
}

impl Inbox {
    pub(crate) fn new(rx: mpsc::Receiver<PluginResult>) -> Self {
        Self {
            rx,
            parked: VecDeque::new(),
        }
    }

    fn take_parked(&mut self, callback_id: CallbackId) -> Option<PluginResult> {
        let index = self
            .parked
            .iter()
            .position(|result| result.callback_id == callback_id)?;
        self.parked.remove(index)
    }
}

/// Blocking iterator over plugin results
///
/// `next()` blocks until a result is available and returns `None` once the
/// worker has exited and nothing is left. Clones share one queue, so each
/// result is handed out once.
#[derive(Clone)]
pub struct PluginResultIterator {
    inbox: Arc<Mutex<Inbox>>,
}

impl PluginResultIterator {
    pub(crate) fn new(inbox: Arc<Mutex<Inbox>>) -> Self {
        Self { inbox }
    }

    /// Block until any result is available
    pub fn recv(&self) -> Option<PluginResult> {
        let mut inbox = self.inbox.lock().ok()?;
        match inbox.parked.pop_front() {
            Some(result) => Some(result),
            None => inbox.rx.recv().ok(),
        }
    }

    /// Take a result if one is already available
    pub fn try_recv(&self) -> Option<PluginResult> {
        let mut inbox = self.inbox.lock().ok()?;
        match inbox.parked.pop_front() {
            Some(result) => Some(result),
            None => inbox.rx.try_recv().ok(),
        }
    }

    /// Block until any result is available or `timeout` expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PluginResult> {
        let mut inbox = self.inbox.lock().ok()?;
        match inbox.parked.pop_front() {
            Some(result) => Some(result),
            None => inbox.rx.recv_timeout(timeout).ok(),
        }
    }

    /// Wait up to `timeout` for the next result carrying `callback_id`
    ///
    /// Results for other callbacks received while waiting are parked, not
    /// dropped.
    pub fn recv_for(&self, callback_id: CallbackId, timeout: Duration) -> Option<PluginResult> {
        let deadline = Instant::now() + timeout;
        let mut inbox = self.inbox.lock().ok()?;
        if let Some(result) = inbox.take_parked(callback_id) {
            return Some(result);
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let result = inbox.rx.recv_timeout(remaining).ok()?;
            if result.callback_id == callback_id {
                return Some(result);
            }
            inbox.parked.push_back(result);
        }
    }

    /// Every result for one callback, ending after its final result
    ///
    /// A watch yields results until it is cleared or fails; a one-shot
    /// action yields exactly one. Each step waits up to `timeout`.
    pub fn results_for(&self, callback_id: CallbackId, timeout: Duration) -> CallbackResults<'_> {
        CallbackResults {
            inner: self,
            callback_id,
            timeout,
            finished: false,
        }
    }
}

impl Iterator for PluginResultIterator {
    type Item = PluginResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

/// Results for a single callback, see [`PluginResultIterator::results_for`]
pub struct CallbackResults<'a> {
    inner: &'a PluginResultIterator,
    callback_id: CallbackId,
    timeout: Duration,
    finished: bool,
}

impl Iterator for CallbackResults<'_> {
    type Item = PluginResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.inner.recv_for(self.callback_id, self.timeout)?;
        self.finished = !result.keep_callback;
        Some(result)
    }
}
