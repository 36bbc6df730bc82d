//! Configuration types for the locus-broker crate
//!
//! This module defines the settings that control request timeouts and the
//! capabilities checked by `getPermissions`.

use std::time::Duration;

use locus_provider::Capability;

/// Configuration for the Broker
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Timeout applied to one-shots and watches that do not carry their own
    /// Default: None (requests wait until resolved or cleared)
    pub default_timeout: Option<Duration>,

    /// Upper bound for any requested timeout; longer requests are clamped
    /// Default: 10 minutes
    pub max_timeout: Duration,

    /// Capabilities that `getPermissions` checks and prompts for
    /// Default: every capability
    pub capabilities: Vec<Capability>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_timeout: None,
            max_timeout: Duration::from_secs(600), // 10 minutes
            capabilities: Capability::ALL.to_vec(),
        }
    }
}

impl BrokerConfig {
    /// Create a new BrokerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a BrokerConfig where every request gives up after 30 seconds
    /// unless the client asks for something else
    pub fn bounded_requests() -> Self {
        Self {
            default_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        }
    }

    /// Create a BrokerConfig that only checks location capabilities
    pub fn location_only() -> Self {
        Self {
            capabilities: vec![Capability::CoarseLocation, Capability::FineLocation],
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), crate::BrokerError> {
        if self.max_timeout == Duration::ZERO {
            return Err(crate::BrokerError::Configuration(
                "Max timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(timeout) = self.default_timeout {
            if timeout == Duration::ZERO {
                return Err(crate::BrokerError::Configuration(
                    "Default timeout must be greater than 0".to_string(),
                ));
            }
            if timeout > self.max_timeout {
                return Err(crate::BrokerError::Configuration(
                    "Default timeout must not exceed max timeout".to_string(),
                ));
            }
        }

        if self.capabilities.is_empty() {
            return Err(crate::BrokerError::Configuration(
                "At least one capability must be configured".to_string(),
            ));
        }

        Ok(())
    }

    /// Effective timeout for a request: its own value or the default,
    /// clamped to `max_timeout`.
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        let timeout = requested.or(self.default_timeout)?;
        if timeout > self.max_timeout {
            tracing::debug!(
                requested_ms = timeout.as_millis() as u64,
                max_ms = self.max_timeout.as_millis() as u64,
                "clamping request timeout"
            );
            return Some(self.max_timeout);
        }
        Some(timeout)
    }

    // Builder pattern methods for fluent configuration

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn with_max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = timeout;
        self
    }

    pub fn with_capabilities(mut self, capabilities: impl Into<Vec<Capability>>) -> Self {
        self.capabilities = capabilities.into();
        self
    }
}
