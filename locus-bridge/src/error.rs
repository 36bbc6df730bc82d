use thiserror::Error;

/// Errors raised by the plugin bridge itself.
///
/// Client-visible failures (bad arguments, timeouts, denied permissions) are
/// never reported here; they arrive as error [`PluginResult`](crate::PluginResult)s.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The tokio runtime for the worker could not be built
    #[error("Failed to build worker runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The worker thread could not be started
    #[error("Failed to spawn broker worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// The worker is gone and no longer accepts commands
    #[error("Broker worker has disconnected")]
    WorkerDisconnected,

    /// Arguments passed as text were not valid JSON
    #[error("Invalid JSON arguments: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Error creating or talking to the broker
    #[error("Broker error: {0}")]
    Broker(#[from] locus_broker::BrokerError),
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
