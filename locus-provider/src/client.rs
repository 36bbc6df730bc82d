//! Collaborator traits implemented by a positioning backend and a host runtime.
//!
//! The broker never talks to a positioning engine directly. It asks a
//! [`ProviderFactory`] for clients once credentials are known, drives the
//! session through a [`LocationClient`], fetches resources through a
//! [`ResourceClient`], and checks platform permissions through a
//! [`PermissionGate`]. Everything flowing back (events, permission results)
//! goes through callback objects that may be invoked from any thread.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    Capability, Credentials, ExplicitPosition, FloorPlan, Location, PermissionGrant, RegionEvent,
};

/// Events pushed by a running positioning session.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// A new position fix
    Location(Location),
    /// Region entry or exit
    Region(RegionEvent),
    /// The session died; pending requests can no longer be answered
    SessionFailed(String),
}

/// Cloneable handle a provider uses to push events back to the broker.
///
/// The sink may be called from any thread. `emit` returns `false` once the
/// receiving side is gone, after which the provider may stop emitting.
#[derive(Clone)]
pub struct EventSink {
    deliver: Arc<dyn Fn(ProviderEvent) -> bool + Send + Sync>,
}

impl EventSink {
    /// Create a sink from a delivery function.
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(ProviderEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn emit(&self, event: ProviderEvent) -> bool {
        (self.deliver)(event)
    }

    pub fn location(&self, location: Location) -> bool {
        self.emit(ProviderEvent::Location(location))
    }

    pub fn region(&self, event: RegionEvent) -> bool {
        self.emit(ProviderEvent::Region(event))
    }

    pub fn session_failed(&self, reason: impl Into<String>) -> bool {
        self.emit(ProviderEvent::SessionFailed(reason.into()))
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// Single-use completion for a platform permission prompt.
///
/// Consuming `complete` guarantees the prompt is answered at most once.
pub struct PermissionCallback {
    complete: Box<dyn FnOnce(Vec<PermissionGrant>) + Send>,
}

impl PermissionCallback {
    pub fn new<F>(complete: F) -> Self
    where
        F: FnOnce(Vec<PermissionGrant>) + Send + 'static,
    {
        Self {
            complete: Box::new(complete),
        }
    }

    pub fn complete(self, grants: Vec<PermissionGrant>) {
        (self.complete)(grants)
    }
}

impl std::fmt::Debug for PermissionCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCallback").finish_non_exhaustive()
    }
}

/// Positioning session lifecycle and explicit position input.
pub trait LocationClient: Send + Sync {
    /// Start delivering location and region events into `sink`.
    fn request_updates(&self, sink: EventSink) -> Result<()>;

    /// Stop the session and drop the sink handed to `request_updates`.
    ///
    /// Also called after the provider reports a session failure, so it must
    /// tolerate a session that has already ended.
    fn remove_updates(&self) -> Result<()>;

    /// Force the provider's notion of the current position.
    fn set_position(&self, position: &ExplicitPosition) -> Result<()>;

    /// Release every resource held by the client.
    fn destroy(&self) {}
}

/// Remote resources published by the provider.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch floor plan metadata. `Ok(None)` means the provider has no such plan.
    ///
    /// The returned future may be dropped before completion; implementations
    /// must treat that as cancellation.
    async fn fetch_floor_plan(&self, floor_plan_id: &str) -> Result<Option<FloorPlan>>;
}

/// Clients produced for one set of credentials.
#[derive(Clone)]
pub struct ProviderClients {
    pub location: Arc<dyn LocationClient>,
    pub resources: Arc<dyn ResourceClient>,
}

impl std::fmt::Debug for ProviderClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClients").finish_non_exhaustive()
    }
}

/// Constructs provider clients once credentials are known.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, credentials: &Credentials) -> Result<ProviderClients>;
}

/// Host runtime permission system.
pub trait PermissionGate: Send + Sync {
    /// Synchronous check whether every capability is already granted.
    fn has_permissions(&self, capabilities: &[Capability]) -> bool;

    /// Prompt for the capabilities and call `callback` once with the decisions.
    fn request_permissions(&self, capabilities: &[Capability], callback: PermissionCallback);
}

/// Gate for hosts without a permission system: everything is granted.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantAll;

impl PermissionGate for GrantAll {
    fn has_permissions(&self, _capabilities: &[Capability]) -> bool {
        true
    }

    fn request_permissions(&self, capabilities: &[Capability], callback: PermissionCallback) {
        callback.complete(
            capabilities
                .iter()
                .copied()
                .map(PermissionGrant::granted)
                .collect(),
        );
    }
}
