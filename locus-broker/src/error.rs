//! Error types for the locus-broker crate.
//!
//! Two families live here. [`PositionError`] is what a client sees: it is
//! delivered through a subscriber and serializes to `{"code", "message"}`.
//! [`BrokerError`] is what a host sees when it talks to the broker handle
//! itself (configuration problems, a broker that has already stopped).

use locus_provider::ProviderError;
use serde::{Serialize, Serializer};

/// Client-visible failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    InvalidCredentials,
    NotInitialized,
    ResourceUnavailable,
    /// Catch-all carrying the underlying provider or runtime message
    Unspecified,
    InvalidArguments,
}

impl ErrorKind {
    /// Numeric code sent to clients.
    pub fn code(&self) -> u8 {
        match self {
            ErrorKind::PermissionDenied => 1,
            ErrorKind::PositionUnavailable => 2,
            ErrorKind::Timeout => 3,
            ErrorKind::InvalidCredentials => 4,
            ErrorKind::NotInitialized => 5,
            ErrorKind::ResourceUnavailable => 6,
            ErrorKind::Unspecified => 7,
            ErrorKind::InvalidArguments => 9,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ErrorKind::PermissionDenied),
            2 => Some(ErrorKind::PositionUnavailable),
            3 => Some(ErrorKind::Timeout),
            4 => Some(ErrorKind::InvalidCredentials),
            5 => Some(ErrorKind::NotInitialized),
            6 => Some(ErrorKind::ResourceUnavailable),
            7 => Some(ErrorKind::Unspecified),
            9 => Some(ErrorKind::InvalidArguments),
            _ => None,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "Permission denied",
            ErrorKind::PositionUnavailable => "Position unavailable",
            ErrorKind::Timeout => "Position request timed out",
            ErrorKind::InvalidCredentials => "Invalid API key or secret",
            ErrorKind::NotInitialized => "Positioning has not been initialized",
            ErrorKind::ResourceUnavailable => "Floor plan unavailable",
            ErrorKind::Unspecified => "Unspecified error",
            ErrorKind::InvalidArguments => "Invalid arguments",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::PositionUnavailable => "POSITION_UNAVAILABLE",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorKind::NotInitialized => "NOT_INITIALIZED",
            ErrorKind::ResourceUnavailable => "RESOURCE_UNAVAILABLE",
            ErrorKind::Unspecified => "UNSPECIFIED",
            ErrorKind::InvalidArguments => "INVALID_ARGUMENTS",
        };
        f.write_str(name)
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Error delivered to a client through its subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PositionError {
    #[serde(rename = "code")]
    kind: ErrorKind,
    message: String,
}

impl PositionError {
    /// Error with the kind's default message.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
        }
    }

    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::InvalidArguments, message)
    }

    pub fn unspecified(message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::Unspecified, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The `{"code", "message"}` object handed to clients.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.kind.code(),
            "message": self.message,
        })
    }
}

impl From<ProviderError> for PositionError {
    fn from(error: ProviderError) -> Self {
        PositionError::unspecified(error.to_string())
    }
}

/// Errors from talking to the broker itself.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The broker loop has exited and no longer accepts messages
    #[error("Broker has stopped")]
    Stopped,

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Convenience type alias for Results using BrokerError.
pub type Result<T> = std::result::Result<T, BrokerError>;
