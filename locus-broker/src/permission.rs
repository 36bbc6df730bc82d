//! Deferred permission prompts.
//!
//! Each `getPermissions` that cannot be answered synchronously parks its
//! subscriber in a slot. The platform callback carries the slot id back, and
//! the slot is resolved at most once: answers for a slot that is already gone
//! are dropped.

use std::collections::HashMap;

use locus_provider::PermissionGrant;
use tracing::{debug, warn};

use crate::error::{ErrorKind, PositionError};
use crate::subscriber::Subscriber;
use crate::types::PermissionRequestId;

#[derive(Default)]
pub struct PermissionSlots {
    pending: HashMap<PermissionRequestId, Subscriber>,
    next_id: u64,
}

impl PermissionSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `subscriber` until the platform answers.
    pub fn open(&mut self, subscriber: Subscriber) -> PermissionRequestId {
        self.next_id += 1;
        let id = PermissionRequestId::new(self.next_id);
        self.pending.insert(id, subscriber);
        debug!(permission_request = %id, "permission prompt pending");
        id
    }

    /// Resolve a slot: success if every capability was granted,
    /// `PermissionDenied` otherwise.
    pub fn resolve(&mut self, id: PermissionRequestId, grants: &[PermissionGrant]) -> bool {
        let Some(subscriber) = self.pending.remove(&id) else {
            debug!(permission_request = %id, "late permission answer ignored");
            return false;
        };

        let denied: Vec<String> = grants
            .iter()
            .filter(|grant| !grant.granted)
            .map(|grant| format!("{:?}", grant.capability))
            .collect();

        if denied.is_empty() {
            subscriber.succeed(None);
        } else {
            warn!(permission_request = %id, denied = ?denied, "permissions denied");
            subscriber.fail(PositionError::with_message(
                ErrorKind::PermissionDenied,
                format!("Permission denied: {}", denied.join(", ")),
            ));
        }
        true
    }

    /// Forget every pending prompt without answering it.
    pub fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
