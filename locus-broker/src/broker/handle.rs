//! Client-facing handle to a running broker.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::command::Command;
use crate::error::{BrokerError, Result};
use crate::subscriber::Subscriber;

use super::core::Message;

/// Snapshot of broker state, mostly useful for tests and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub initialized: bool,
    pub session_running: bool,
    pub position_watches: usize,
    pub region_watches: usize,
    pub pending_one_shots: usize,
    pub scheduled_timeouts: usize,
    pub fetch_in_flight: bool,
    pub pending_permission_prompts: usize,
    pub session_starts: u64,
    pub session_stops: u64,
}

impl BrokerStats {
    /// Watches plus pending one-shots.
    pub fn registered(&self) -> usize {
        self.position_watches + self.region_watches + self.pending_one_shots
    }
}

impl std::fmt::Display for BrokerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Broker Stats:")?;
        writeln!(f, "  Initialized: {}", self.initialized)?;
        writeln!(f, "  Session running: {}", self.session_running)?;
        writeln!(f, "  Position watches: {}", self.position_watches)?;
        writeln!(f, "  Region watches: {}", self.region_watches)?;
        writeln!(f, "  Pending one-shots: {}", self.pending_one_shots)?;
        writeln!(f, "  Scheduled timeouts: {}", self.scheduled_timeouts)?;
        writeln!(f, "  Fetch in flight: {}", self.fetch_in_flight)?;
        writeln!(f, "  Pending permission prompts: {}", self.pending_permission_prompts)?;
        write!(
            f,
            "  Session starts/stops: {}/{}",
            self.session_starts, self.session_stops
        )
    }
}

/// Cloneable sender side of the broker.
///
/// Every method only enqueues a message; results arrive on the subscriber
/// passed with the command.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl BrokerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    /// Parse and submit a command.
    ///
    /// Argument errors are answered on `subscriber` right away and never reach
    /// the broker loop. `Err` is only returned when the broker has stopped.
    pub fn execute(&self, action: &str, args: &Value, subscriber: Subscriber) -> Result<()> {
        match Command::parse(action, args) {
            Ok(command) => self.execute_command(command, subscriber),
            Err(error) => {
                tracing::debug!(action = %action, error = %error, "rejected command");
                subscriber.fail(error);
                Ok(())
            }
        }
    }

    /// Submit an already parsed command.
    pub fn execute_command(&self, command: Command, subscriber: Subscriber) -> Result<()> {
        self.send(Message::Command {
            command,
            subscriber,
        })
    }

    /// Ask for a stats snapshot without waiting for it.
    pub fn request_stats(&self) -> Result<oneshot::Receiver<BrokerStats>> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Stats(tx))?;
        Ok(rx)
    }

    /// Stats snapshot taken after every previously submitted message was handled.
    pub async fn stats(&self) -> Result<BrokerStats> {
        self.request_stats()?
            .await
            .map_err(|_| BrokerError::Stopped)
    }

    /// Ask the broker to tear down without waiting for it.
    pub fn request_shutdown(&self) -> Result<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Shutdown(tx))?;
        Ok(rx)
    }

    /// Tear down the broker and wait until it has released the provider.
    pub async fn shutdown(&self) -> Result<()> {
        self.request_shutdown()?
            .await
            .map_err(|_| BrokerError::Stopped)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, message: Message) -> Result<()> {
        self.tx.send(message).map_err(|_| BrokerError::Stopped)
    }
}
