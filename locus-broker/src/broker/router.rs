//! Command dispatch.
//!
//! Every command is answered exactly once on its subscriber, except watches
//! (one reply per event until cleared or timed out) and deferred permission
//! prompts (one reply when the platform answers).

use std::time::Duration;

use locus_provider::{Credentials, ExplicitPosition, LatLng, ProviderClients};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::error::{ErrorKind, PositionError};
use crate::subscriber::Subscriber;
use crate::types::WatchKind;

use super::core::Broker;

impl Broker {
    pub(super) fn route(&mut self, command: Command, subscriber: Subscriber) {
        debug!(action = command.action(), callback_id = %subscriber.callback_id(), "routing command");

        match command {
            Command::Initialize { credentials } => self.initialize(&credentials, subscriber),
            Command::AddWatch {
                kind,
                watch_id,
                timeout,
            } => self.add_watch(kind, watch_id, timeout, subscriber),
            Command::ClearWatch { kind, watch_id } => self.clear_watch(kind, &watch_id, subscriber),
            Command::GetLocation { timeout } => self.get_location(timeout, subscriber),
            Command::SetPosition {
                region_id,
                coordinate,
            } => self.set_position(region_id.as_deref(), coordinate, subscriber),
            Command::FetchFloorPlan { floor_plan_id } => {
                self.fetch_floor_plan(floor_plan_id, subscriber)
            }
            Command::GetPermissions => self.get_permissions(subscriber),
        }
    }

    /// Clients, or `NotInitialized` on the subscriber.
    fn require_clients(&self, subscriber: Subscriber) -> Option<(ProviderClients, Subscriber)> {
        match &self.clients {
            Some(clients) => Some((clients.clone(), subscriber)),
            None => {
                subscriber.fail(PositionError::new(ErrorKind::NotInitialized));
                None
            }
        }
    }

    fn initialize(&mut self, credentials: &Credentials, subscriber: Subscriber) {
        if self.clients.is_some() {
            debug!("already initialized");
            subscriber.succeed(None);
            return;
        }

        match self.factory.create(credentials) {
            Ok(clients) => {
                info!(api_key = %credentials.api_key, "provider clients created");
                self.clients = Some(clients);
                subscriber.succeed(None);
            }
            Err(e) => {
                warn!(error = %e, "failed to create provider clients");
                subscriber.fail(e.into());
            }
        }
    }

    fn add_watch(
        &mut self,
        kind: WatchKind,
        watch_id: String,
        timeout: Option<Duration>,
        subscriber: Subscriber,
    ) {
        let Some((_, subscriber)) = self.require_clients(subscriber) else {
            return;
        };

        let (request_id, replaced) = self.registry.add_watch(kind, watch_id, subscriber);
        if let Some(replaced) = replaced {
            self.timers.cancel(replaced);
        }
        self.schedule_timeout(request_id, timeout);

        if let Err(e) = self.ensure_session() {
            warn!(error = %e, "failed to start positioning session");
            self.timers.cancel(request_id);
            if let Some(subscriber) = self.registry.remove_by_request(request_id) {
                subscriber.fail(e.into());
            }
            self.reconcile_session();
        }
    }

    fn clear_watch(&mut self, kind: WatchKind, watch_id: &str, subscriber: Subscriber) {
        if let Some(request_id) = self.registry.remove_watch(kind, watch_id) {
            self.timers.cancel(request_id);
        }
        subscriber.succeed(None);
        self.reconcile_session();
    }

    fn get_location(&mut self, timeout: Option<Duration>, subscriber: Subscriber) {
        let Some((_, subscriber)) = self.require_clients(subscriber) else {
            return;
        };

        if self.session.is_running() {
            match self.registry.last_location() {
                Some(location) => match serde_json::to_value(location) {
                    Ok(payload) => subscriber.succeed(Some(payload)),
                    Err(e) => subscriber.fail(PositionError::unspecified(e.to_string())),
                },
                None => subscriber.fail(PositionError::new(ErrorKind::PositionUnavailable)),
            }
            return;
        }

        let request_id = self.registry.add_one_shot(subscriber);
        self.schedule_timeout(request_id, timeout);

        if let Err(e) = self.ensure_session() {
            warn!(error = %e, "failed to start positioning session");
            self.timers.cancel(request_id);
            if let Some(subscriber) = self.registry.remove_by_request(request_id) {
                subscriber.fail(e.into());
            }
            self.reconcile_session();
        }
    }

    fn set_position(
        &mut self,
        region_id: Option<&str>,
        coordinate: Option<LatLng>,
        subscriber: Subscriber,
    ) {
        let Some((clients, subscriber)) = self.require_clients(subscriber) else {
            return;
        };

        let Some(position) = ExplicitPosition::new(region_id, coordinate) else {
            subscriber.fail(PositionError::invalid_arguments(
                "Either a region id or a [latitude, longitude] pair is required",
            ));
            return;
        };

        match clients.location.set_position(&position) {
            Ok(()) => {
                debug!(position = ?position, "explicit position set");
                subscriber.succeed(None);
            }
            Err(e) => subscriber.fail(e.into()),
        }
    }

    fn fetch_floor_plan(&mut self, floor_plan_id: String, subscriber: Subscriber) {
        let Some((clients, subscriber)) = self.require_clients(subscriber) else {
            return;
        };

        let on_complete = self.fetch_completion();
        self.fetches
            .start(floor_plan_id, subscriber, clients.resources, on_complete);
    }

    fn get_permissions(&mut self, subscriber: Subscriber) {
        if self.gate.has_permissions(&self.config.capabilities) {
            subscriber.succeed(None);
            return;
        }

        let request_id = self.permissions.open(subscriber);
        let callback = self.permission_callback(request_id);
        self.gate
            .request_permissions(&self.config.capabilities, callback);
    }
}
