//! Background worker thread hosting the broker
//!
//! The worker owns a single-threaded tokio runtime, runs the broker loop on
//! it, and forwards every reply to the host as a [`PluginResult`].

use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use locus_broker::{Broker, Reply};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::{BridgeError, Result};
use crate::result::PluginResult;

const WORKER_THREAD_NAME: &str = "locus-broker";

/// Start the worker thread for `broker`
///
/// The runtime is built before the thread is spawned so either failure is
/// reported to the caller instead of being logged from inside the thread.
pub(crate) fn spawn_broker_worker(
    broker: Broker,
    reply_rx: mpsc::UnboundedReceiver<Reply>,
    result_tx: std_mpsc::Sender<PluginResult>,
) -> Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error!(error = %e, "failed to build broker worker runtime");
            BridgeError::Runtime(e)
        })?;

    thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || runtime.block_on(run_worker(broker, reply_rx, result_tx)))
        .map_err(|e| {
            error!(error = %e, "failed to spawn broker worker thread");
            BridgeError::WorkerSpawn(e)
        })
}

/// Drive the broker and forward replies until the broker stops
async fn run_worker(
    broker: Broker,
    mut reply_rx: mpsc::UnboundedReceiver<Reply>,
    result_tx: std_mpsc::Sender<PluginResult>,
) {
    debug!("broker worker started");

    let run = broker.run();
    tokio::pin!(run);

    loop {
        tokio::select! {
            _ = &mut run => break,
            reply = reply_rx.recv() => match reply {
                Some(reply) => forward(&result_tx, reply),
                None => {
                    // Nobody can submit commands anymore; let the broker wind down.
                    (&mut run).await;
                    break;
                }
            },
        }
    }

    // Teardown may have resolved an in-flight fetch.
    let mut drained = 0;
    while let Ok(reply) = reply_rx.try_recv() {
        forward(&result_tx, reply);
        drained += 1;
    }

    info!(drained, "broker worker stopped");
}

fn forward(result_tx: &std_mpsc::Sender<PluginResult>, reply: Reply) {
    let result = PluginResult::from(reply);
    debug!(callback_id = %result.callback_id, status = ?result.status, "forwarding result");
    // The host may have dropped its receiver; results are then discarded.
    let _ = result_tx.send(result);
}
