//! Error types for positioning providers.

/// Errors reported by a positioning provider or its clients.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// The provider refused to construct clients for the given credentials
    #[error("Client construction failed: {0}")]
    ClientCreation(String),

    /// Starting or stopping the positioning session failed
    #[error("Positioning session error: {0}")]
    Session(String),

    /// The provider rejected an explicit position
    #[error("Failed to set position: {0}")]
    SetPosition(String),

    /// A resource fetch failed for a reason other than a missing resource
    #[error("Resource fetch failed: {0}")]
    Fetch(String),

    /// The provider has been destroyed and can no longer be used
    #[error("Provider has been destroyed")]
    Destroyed,
}

/// Convenience type alias for Results using ProviderError.
pub type Result<T> = std::result::Result<T, ProviderError>;
