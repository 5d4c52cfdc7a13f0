use thiserror::Error;
use uuid::Uuid;

/// Failure reported by an addon provider. Providers never retry internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("resource cannot be allocated: {0}")]
    AllocationFailed(String),

    #[error("resource {0} does not exist")]
    ResourceMissing(Uuid),

    #[error("resource {0} is not ready")]
    NotReady(Uuid),

    #[error("provisioning failed: {0}")]
    ProvisionFailed(String),

    #[error("deprovision cannot start: {0}")]
    DeprovisionFailed(String),

    #[error("provider error: {0}")]
    Other(String),
}

/// Unknown or misconfigured provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("provider {name} uses unregistered kind '{kind}'")]
    UnknownKind { name: String, kind: String },

    #[error("invalid option for provider {provider}: {message}")]
    InvalidOption { provider: String, message: String },
}
