//! Response sinks handed to the broker with every command.
//!
//! A [`Subscriber`] wraps the sending half of a reply channel together with
//! the client's [`CallbackId`]. The consuming resolvers (`succeed`, `fail`,
//! `no_result`) make it impossible to answer a one-shot twice; watches use
//! [`Subscriber::push`], which keeps the subscriber alive and marks the reply
//! with `keep_callback = true`.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::PositionError;
use crate::types::CallbackId;

/// How a reply resolves its callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Option<Value>),
    Error(PositionError),
    NoResult,
}

/// One reply sent back to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub callback_id: CallbackId,
    pub outcome: Outcome,
    /// More replies will follow on the same callback
    pub keep_callback: bool,
}

impl Reply {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// The error kind, if this reply is an error.
    pub fn error_kind(&self) -> Option<crate::ErrorKind> {
        match &self.outcome {
            Outcome::Error(error) => Some(error.kind()),
            _ => None,
        }
    }

    /// The success payload, if any.
    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Success(payload) => payload.as_ref(),
            _ => None,
        }
    }
}

/// Response sink for one client callback.
#[derive(Debug)]
pub struct Subscriber {
    callback_id: CallbackId,
    tx: mpsc::UnboundedSender<Reply>,
}

impl Subscriber {
    pub fn new(callback_id: CallbackId, tx: mpsc::UnboundedSender<Reply>) -> Self {
        Self { callback_id, tx }
    }

    /// A subscriber with a fresh callback id and its own reply channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Reply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(CallbackId::new(), tx), rx)
    }

    pub fn callback_id(&self) -> CallbackId {
        self.callback_id
    }

    pub fn succeed(self, payload: Option<Value>) {
        self.send(Outcome::Success(payload), false);
    }

    pub fn fail(self, error: PositionError) {
        self.send(Outcome::Error(error), false);
    }

    pub fn no_result(self) {
        self.send(Outcome::NoResult, false);
    }

    /// Deliver one watch event; the subscriber stays registered.
    pub fn push(&self, payload: Value) {
        self.send(Outcome::Success(Some(payload)), true);
    }

    fn send(&self, outcome: Outcome, keep_callback: bool) {
        // A client that went away simply stops receiving.
        let _ = self.tx.send(Reply {
            callback_id: self.callback_id,
            outcome,
            keep_callback,
        });
    }
}
