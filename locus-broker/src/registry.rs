//! Pending one-shots and named watches
//!
//! The registry is owned by the broker loop, so it needs no locking. Every
//! entry gets a fresh [`RequestId`] when it is registered; the broker keys its
//! timers by that id, which keeps a timer bound to the exact registration it
//! was created for even when a watch id is reused.

use std::collections::HashMap;

use locus_provider::{Location, RegionEvent};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PositionError;
use crate::subscriber::Subscriber;
use crate::types::{RequestId, WatchKind};

struct WatchEntry {
    request_id: RequestId,
    subscriber: Subscriber,
}

/// Where a request id currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Watch(WatchKind, String),
    OneShot,
}

/// Registry of everyone waiting for provider events
pub struct WatchRegistry {
    position_watches: HashMap<String, WatchEntry>,
    region_watches: HashMap<String, WatchEntry>,
    one_shots: HashMap<RequestId, Subscriber>,
    index: HashMap<RequestId, Slot>,
    last_location: Option<Location>,
    next_id: u64,
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self {
            position_watches: HashMap::new(),
            region_watches: HashMap::new(),
            one_shots: HashMap::new(),
            index: HashMap::new(),
            last_location: None,
            next_id: 1,
        }
    }

    fn allocate(&mut self) -> RequestId {
        let id = RequestId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn watches_mut(&mut self, kind: WatchKind) -> &mut HashMap<String, WatchEntry> {
        match kind {
            WatchKind::Position => &mut self.position_watches,
            WatchKind::Region => &mut self.region_watches,
        }
    }

    fn watches(&self, kind: WatchKind) -> &HashMap<String, WatchEntry> {
        match kind {
            WatchKind::Position => &self.position_watches,
            WatchKind::Region => &self.region_watches,
        }
    }

    /// Register a watch under `watch_id`.
    ///
    /// Returns the new request id and, if the id was already in use, the
    /// request id of the registration it replaced. The replaced subscriber is
    /// dropped without being resolved.
    pub fn add_watch(
        &mut self,
        kind: WatchKind,
        watch_id: impl Into<String>,
        subscriber: Subscriber,
    ) -> (RequestId, Option<RequestId>) {
        let watch_id = watch_id.into();
        let request_id = self.allocate();

        let replaced = self
            .watches_mut(kind)
            .insert(
                watch_id.clone(),
                WatchEntry {
                    request_id,
                    subscriber,
                },
            )
            .map(|old| old.request_id);

        if let Some(old_id) = replaced {
            self.index.remove(&old_id);
            warn!(
                kind = %kind,
                watch_id = %watch_id,
                replaced = %old_id,
                "watch id reused, previous subscriber dropped"
            );
        }

        debug!(kind = %kind, watch_id = %watch_id, request_id = %request_id, "watch registered");
        self.index.insert(request_id, Slot::Watch(kind, watch_id));
        (request_id, replaced)
    }

    /// Register a subscriber waiting for exactly one location.
    pub fn add_one_shot(&mut self, subscriber: Subscriber) -> RequestId {
        let request_id = self.allocate();
        self.one_shots.insert(request_id, subscriber);
        self.index.insert(request_id, Slot::OneShot);
        debug!(request_id = %request_id, "one-shot registered");
        request_id
    }

    /// Remove a watch by its caller-supplied id. Idempotent.
    pub fn remove_watch(&mut self, kind: WatchKind, watch_id: &str) -> Option<RequestId> {
        let entry = self.watches_mut(kind).remove(watch_id)?;
        self.index.remove(&entry.request_id);
        debug!(kind = %kind, watch_id = %watch_id, request_id = %entry.request_id, "watch removed");
        Some(entry.request_id)
    }

    /// Remove whatever is registered under `request_id` and hand back its
    /// subscriber. Idempotent.
    pub fn remove_by_request(&mut self, request_id: RequestId) -> Option<Subscriber> {
        match self.index.remove(&request_id)? {
            Slot::OneShot => self.one_shots.remove(&request_id),
            Slot::Watch(kind, watch_id) => self
                .watches_mut(kind)
                .remove(&watch_id)
                .map(|entry| entry.subscriber),
        }
    }

    pub fn contains(&self, request_id: RequestId) -> bool {
        self.index.contains_key(&request_id)
    }

    pub fn contains_watch(&self, kind: WatchKind, watch_id: &str) -> bool {
        self.watches(kind).contains_key(watch_id)
    }

    /// Deliver a location to every position watch and every pending one-shot.
    ///
    /// One-shots are removed as they resolve. The location becomes the cached
    /// last known location. Returns the request ids that received it.
    pub fn deliver_location(&mut self, location: &Location) -> Vec<RequestId> {
        self.last_location = Some(location.clone());

        let Some(payload) = to_payload(location) else {
            return Vec::new();
        };

        let mut delivered = Vec::with_capacity(self.position_watches.len() + self.one_shots.len());

        for entry in self.position_watches.values() {
            entry.subscriber.push(payload.clone());
            delivered.push(entry.request_id);
        }

        for (request_id, subscriber) in self.one_shots.drain() {
            self.index.remove(&request_id);
            subscriber.succeed(Some(payload.clone()));
            delivered.push(request_id);
        }

        debug!(receivers = delivered.len(), "location delivered");
        delivered
    }

    /// Deliver a region event to every region watch.
    pub fn deliver_region_event(&mut self, event: &RegionEvent) -> Vec<RequestId> {
        let Some(payload) = to_payload(event) else {
            return Vec::new();
        };

        let delivered: Vec<RequestId> = self
            .region_watches
            .values()
            .map(|entry| {
                entry.subscriber.push(payload.clone());
                entry.request_id
            })
            .collect();

        debug!(
            region_id = %event.region.region_id,
            receivers = delivered.len(),
            "region event delivered"
        );
        delivered
    }

    pub fn last_location(&self) -> Option<&Location> {
        self.last_location.as_ref()
    }

    /// Resolve every subscriber with `error` and empty the registry.
    pub fn fail_all(&mut self, error: &PositionError) -> Vec<RequestId> {
        let drained = self.drain();
        let ids = drained.iter().map(|(id, _)| *id).collect();
        for (_, subscriber) in drained {
            subscriber.fail(error.clone());
        }
        ids
    }

    /// Empty the registry without resolving anyone.
    pub fn clear_all(&mut self) -> Vec<RequestId> {
        self.drain().into_iter().map(|(id, _)| id).collect()
    }

    fn drain(&mut self) -> Vec<(RequestId, Subscriber)> {
        self.index.clear();
        let mut drained: Vec<(RequestId, Subscriber)> = self
            .position_watches
            .drain()
            .chain(self.region_watches.drain())
            .map(|(_, entry)| (entry.request_id, entry.subscriber))
            .collect();
        drained.extend(self.one_shots.drain());
        drained.sort_by_key(|(id, _)| *id);
        drained
    }

    /// Watches plus pending one-shots.
    pub fn len(&self) -> usize {
        self.position_watches.len() + self.region_watches.len() + self.one_shots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn watch_count(&self, kind: WatchKind) -> usize {
        self.watches(kind).len()
    }

    pub fn one_shot_count(&self) -> usize {
        self.one_shots.len()
    }
}

fn to_payload<T: Serialize>(record: &T) -> Option<Value> {
    match serde_json::to_value(record) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "failed to serialize provider record");
            None
        }
    }
}
