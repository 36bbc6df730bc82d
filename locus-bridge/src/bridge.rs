//! Sync-first positioning plugin
//!
//! Hosts submit string actions with JSON arguments and read tagged results
//! back through a blocking iterator. The broker runs on a worker thread.

use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use locus_broker::{
    Broker, BrokerConfig, BrokerError, BrokerHandle, BrokerStats, CallbackId, Reply, Subscriber,
};
use locus_provider::{PermissionGate, ProviderFactory};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{BridgeError, Result};
use crate::iter::{Inbox, PluginResultIterator};
use crate::worker::spawn_broker_worker;

/// Sync facade over the subscription broker
///
/// Every method is blocking and must not be called from inside an async
/// runtime.
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use locus_bridge::PositioningBridge;
///
/// let bridge = PositioningBridge::new(factory, gate)?;
/// bridge.execute("initialize", r#"["key", "secret"]"#)?;
/// let watch = bridge.execute("addWatch", r#"["lobby", 30000]"#)?;
///
/// for result in bridge.iter().results_for(watch, Duration::from_secs(60)) {
///     println!("{}", result.to_json()?);
/// }
/// ```
pub struct PositioningBridge {
    handle: BrokerHandle,

    /// Cloned into every subscriber; replies flow to the worker
    reply_tx: mpsc::UnboundedSender<Reply>,

    inbox: Arc<Mutex<Inbox>>,

    _worker: JoinHandle<()>,
}

impl PositioningBridge {
    /// Create a bridge with the default broker configuration
    pub fn new(factory: Arc<dyn ProviderFactory>, gate: Arc<dyn PermissionGate>) -> Result<Self> {
        Self::with_config(BrokerConfig::default(), factory, gate)
    }

    /// Create a bridge with a custom broker configuration
    pub fn with_config(
        config: BrokerConfig,
        factory: Arc<dyn ProviderFactory>,
        gate: Arc<dyn PermissionGate>,
    ) -> Result<Self> {
        let (broker, handle) = Broker::new(config, factory, gate)?;
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = std_mpsc::channel();

        let worker = spawn_broker_worker(broker, reply_rx, result_tx)?;

        Ok(Self {
            handle,
            reply_tx,
            inbox: Arc::new(Mutex::new(Inbox::new(result_rx))),
            _worker: worker,
        })
    }

    /// Submit an action whose arguments are a JSON text
    ///
    /// An empty string means no arguments. Returns the callback id every
    /// result for this action will carry.
    pub fn execute(&self, action: &str, args_json: &str) -> Result<CallbackId> {
        let args = if args_json.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(args_json)?
        };
        self.execute_value(action, &args)
    }

    /// Submit an action with already-parsed arguments
    ///
    /// Invalid actions or arguments are not errors here; they resolve the
    /// returned callback with an error result.
    pub fn execute_value(&self, action: &str, args: &Value) -> Result<CallbackId> {
        let callback_id = CallbackId::new();
        let subscriber = Subscriber::new(callback_id, self.reply_tx.clone());
        self.handle.execute(action, args, subscriber)?;
        Ok(callback_id)
    }

    /// Blocking iterator over results from every action
    pub fn iter(&self) -> PluginResultIterator {
        PluginResultIterator::new(Arc::clone(&self.inbox))
    }

    /// Snapshot of the broker's bookkeeping
    ///
    /// Results for commands handled before the snapshot may still be in
    /// flight to the iterator.
    pub fn stats(&self) -> Result<BrokerStats> {
        self.handle
            .request_stats()?
            .blocking_recv()
            .map_err(|_| BridgeError::WorkerDisconnected)
    }

    /// Tear down the broker and wait for it to finish
    ///
    /// Pending subscriptions are dropped and an in-flight floor plan fetch
    /// resolves with no result. Calling this again is a no-op.
    pub fn shutdown(&self) -> Result<()> {
        match self.handle.request_shutdown() {
            // A dropped acknowledgement also means the broker is gone.
            Ok(done) => {
                let _ = done.blocking_recv();
                Ok(())
            }
            Err(BrokerError::Stopped) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_closed()
    }
}

impl Drop for PositioningBridge {
    fn drop(&mut self) {
        tracing::debug!("PositioningBridge dropping, stopping broker worker");
        let _ = self.handle.request_shutdown();
    }
}
