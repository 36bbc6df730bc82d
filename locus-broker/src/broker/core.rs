//! Broker state and message loop.

use std::sync::Arc;

use locus_provider::{
    EventSink, FloorPlan, PermissionCallback, PermissionGate, PermissionGrant, ProviderClients,
    ProviderError, ProviderEvent, ProviderFactory,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::BrokerConfig;
use crate::error::{ErrorKind, PositionError, Result};
use crate::fetch::FetchCanceller;
use crate::permission::PermissionSlots;
use crate::registry::WatchRegistry;
use crate::session::Session;
use crate::subscriber::Subscriber;
use crate::timeout::TimeoutSupervisor;
use crate::types::{FetchId, PermissionRequestId, RequestId, WatchKind};

use super::handle::{BrokerHandle, BrokerStats};

/// Everything the broker loop reacts to.
pub(crate) enum Message {
    /// A parsed client command and the sink to answer it on
    Command {
        command: Command,
        subscriber: Subscriber,
    },
    /// Pushed by the provider through its event sink
    Provider(ProviderEvent),
    TimerFired(RequestId),
    FetchCompleted {
        fetch_id: FetchId,
        result: locus_provider::Result<Option<FloorPlan>>,
    },
    PermissionResult {
        request_id: PermissionRequestId,
        grants: Vec<PermissionGrant>,
    },
    Stats(oneshot::Sender<BrokerStats>),
    Shutdown(oneshot::Sender<()>),
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Command { command, .. } => write!(f, "Command({})", command.action()),
            Message::Provider(event) => write!(f, "Provider({event:?})"),
            Message::TimerFired(id) => write!(f, "TimerFired({id})"),
            Message::FetchCompleted { fetch_id, .. } => write!(f, "FetchCompleted({fetch_id})"),
            Message::PermissionResult { request_id, .. } => {
                write!(f, "PermissionResult({request_id})")
            }
            Message::Stats(_) => write!(f, "Stats"),
            Message::Shutdown(_) => write!(f, "Shutdown"),
        }
    }
}

/// Owner of all subscription state.
///
/// Create one with [`Broker::new`], then drive it with [`Broker::run`] on a
/// tokio runtime (or use [`Broker::spawn`] to do both).
pub struct Broker {
    pub(super) config: BrokerConfig,
    pub(super) factory: Arc<dyn ProviderFactory>,
    pub(super) gate: Arc<dyn PermissionGate>,
    pub(super) clients: Option<ProviderClients>,
    pub(super) registry: WatchRegistry,
    pub(super) timers: TimeoutSupervisor,
    pub(super) fetches: FetchCanceller,
    pub(super) permissions: PermissionSlots,
    pub(super) session: Session,
    rx: mpsc::UnboundedReceiver<Message>,
    loopback: mpsc::WeakUnboundedSender<Message>,
}

impl Broker {
    /// Create a broker and the handle used to talk to it.
    pub fn new(
        config: BrokerConfig,
        factory: Arc<dyn ProviderFactory>,
        gate: Arc<dyn PermissionGate>,
    ) -> Result<(Self, BrokerHandle)> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let broker = Self {
            config,
            factory,
            gate,
            clients: None,
            registry: WatchRegistry::new(),
            timers: TimeoutSupervisor::new(),
            fetches: FetchCanceller::new(),
            permissions: PermissionSlots::new(),
            session: Session::new(),
            rx,
            loopback: tx.downgrade(),
        };
        Ok((broker, BrokerHandle::new(tx)))
    }

    /// Create a broker and run it as a task on the current tokio runtime.
    pub fn spawn(
        config: BrokerConfig,
        factory: Arc<dyn ProviderFactory>,
        gate: Arc<dyn PermissionGate>,
    ) -> Result<BrokerHandle> {
        let (broker, handle) = Self::new(config, factory, gate)?;
        tokio::spawn(broker.run());
        Ok(handle)
    }

    /// Process messages until shutdown is requested or every handle is dropped.
    pub async fn run(mut self) {
        info!("broker started");

        while let Some(message) = self.rx.recv().await {
            match message {
                Message::Shutdown(done) => {
                    info!("broker shutdown requested");
                    // Handles observe the stop before the caller is released.
                    self.rx.close();
                    self.teardown();
                    let _ = done.send(());
                    return;
                }
                other => self.handle(other),
            }
        }

        info!("all broker handles dropped");
        self.teardown();
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Command {
                command,
                subscriber,
            } => self.route(command, subscriber),
            Message::Provider(event) => self.on_provider_event(event),
            Message::TimerFired(request_id) => self.on_timeout(request_id),
            Message::FetchCompleted { fetch_id, result } => {
                self.fetches.complete(fetch_id, result);
            }
            Message::PermissionResult { request_id, grants } => {
                self.permissions.resolve(request_id, &grants);
            }
            Message::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Message::Shutdown(_) => {}
        }
    }

    fn on_provider_event(&mut self, event: ProviderEvent) {
        if !self.session.is_running() {
            debug!(event = ?event, "ignoring provider event outside a session");
            return;
        }

        match event {
            ProviderEvent::Location(location) => {
                for request_id in self.registry.deliver_location(&location) {
                    self.timers.cancel(request_id);
                }
                // Resolved one-shots may have emptied the registry.
                self.reconcile_session();
            }
            ProviderEvent::Region(region_event) => {
                for request_id in self.registry.deliver_region_event(&region_event) {
                    self.timers.cancel(request_id);
                }
            }
            ProviderEvent::SessionFailed(reason) => {
                warn!(reason = %reason, "positioning session failed");
                let error = PositionError::from(ProviderError::Session(reason));
                for request_id in self.registry.fail_all(&error) {
                    self.timers.cancel(request_id);
                }
                // Release the provider's registration so the next start is clean.
                match self.clients.as_ref() {
                    Some(clients) => {
                        self.session.stop(clients.location.as_ref());
                    }
                    None => self.session.mark_stopped(),
                }
            }
        }
    }

    fn on_timeout(&mut self, request_id: RequestId) {
        if !self.timers.complete(request_id) {
            debug!(request_id = %request_id, "ignoring stale timer");
            return;
        }

        if let Some(subscriber) = self.registry.remove_by_request(request_id) {
            debug!(request_id = %request_id, "request timed out");
            subscriber.fail(PositionError::new(ErrorKind::Timeout));
        }
        self.reconcile_session();
    }

    /// Stop the provider session once nobody is waiting for events.
    pub(super) fn reconcile_session(&mut self) {
        if !self.registry.is_empty() || !self.session.is_running() {
            return;
        }
        if let Some(clients) = &self.clients {
            self.session.stop(clients.location.as_ref());
        }
    }

    /// Start the provider session if it is not running yet.
    pub(super) fn ensure_session(&mut self) -> locus_provider::Result<()> {
        let Some(clients) = &self.clients else {
            return Err(ProviderError::Session("clients not initialized".to_string()));
        };
        let sink = self.event_sink();
        self.session.start(clients.location.as_ref(), sink)?;
        Ok(())
    }

    /// Schedule a timeout for `request_id` if the request or config asks for one.
    pub(super) fn schedule_timeout(
        &mut self,
        request_id: RequestId,
        requested: Option<std::time::Duration>,
    ) {
        let Some(timeout) = self.config.effective_timeout(requested) else {
            return;
        };
        let loopback = self.loopback.clone();
        self.timers.schedule(request_id, timeout, move |request_id| {
            if let Some(tx) = loopback.upgrade() {
                let _ = tx.send(Message::TimerFired(request_id));
            }
        });
    }

    pub(super) fn event_sink(&self) -> EventSink {
        let loopback = self.loopback.clone();
        EventSink::new(move |event| match loopback.upgrade() {
            Some(tx) => tx.send(Message::Provider(event)).is_ok(),
            None => false,
        })
    }

    pub(super) fn fetch_completion(
        &self,
    ) -> impl FnOnce(FetchId, locus_provider::Result<Option<FloorPlan>>) + Send + 'static {
        let loopback = self.loopback.clone();
        move |fetch_id, result| {
            if let Some(tx) = loopback.upgrade() {
                let _ = tx.send(Message::FetchCompleted { fetch_id, result });
            }
        }
    }

    pub(super) fn permission_callback(&self, request_id: PermissionRequestId) -> PermissionCallback {
        let loopback = self.loopback.clone();
        PermissionCallback::new(move |grants| {
            if let Some(tx) = loopback.upgrade() {
                let _ = tx.send(Message::PermissionResult { request_id, grants });
            }
        })
    }

    pub(super) fn stats(&self) -> BrokerStats {
        BrokerStats {
            initialized: self.clients.is_some(),
            session_running: self.session.is_running(),
            position_watches: self.registry.watch_count(WatchKind::Position),
            region_watches: self.registry.watch_count(WatchKind::Region),
            pending_one_shots: self.registry.one_shot_count(),
            scheduled_timeouts: self.timers.len(),
            fetch_in_flight: self.fetches.is_active(),
            pending_permission_prompts: self.permissions.len(),
            session_starts: self.session.start_count(),
            session_stops: self.session.stop_count(),
        }
    }

    /// Release everything the broker holds. Pending subscribers are dropped
    /// unresolved, except an active fetch which resolves with no result.
    fn teardown(&mut self) {
        if let Some(clients) = &self.clients {
            self.session.stop(clients.location.as_ref());
        }
        self.timers.cancel_all();
        self.fetches.cancel();
        let dropped_prompts = self.permissions.clear();
        let dropped_requests = self.registry.clear_all().len();

        if let Some(clients) = self.clients.take() {
            clients.location.destroy();
        }

        info!(
            dropped_requests,
            dropped_prompts, "broker stopped"
        );
    }
}
