//! Tagged results handed back to the host.

use locus_broker::{CallbackId, Outcome, Reply};
use serde::Serialize;
use serde_json::Value;

/// How a result resolves its callback on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultStatus {
    Ok,
    Error,
    NoResult,
}

/// One result for one client callback.
///
/// Serializes to `{"callbackId", "status", "payload"?, "keepCallback"}`.
/// Error payloads are the `{"code", "message"}` error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginResult {
    pub callback_id: CallbackId,
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub keep_callback: bool,
}

impl PluginResult {
    pub fn is_ok(&self) -> bool {
        self.status == ResultStatus::Ok
    }

    /// Numeric error code, for error results.
    pub fn error_code(&self) -> Option<u64> {
        match self.status {
            ResultStatus::Error => self.payload.as_ref()?.get("code")?.as_u64(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<Reply> for PluginResult {
    fn from(reply: Reply) -> Self {
        let (status, payload) = match reply.outcome {
            Outcome::Success(payload) => (ResultStatus::Ok, payload),
            Outcome::Error(error) => (ResultStatus::Error, Some(error.to_value())),
            Outcome::NoResult => (ResultStatus::NoResult, None),
        };
        Self {
            callback_id: reply.callback_id,
            status,
            payload,
            keep_callback: reply.keep_callback,
        }
    }
}
