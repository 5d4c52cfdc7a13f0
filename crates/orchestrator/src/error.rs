use thiserror::Error;
use tigerhost_addons_providers::ConfigurationError;
use tigerhost_addons_state::TransitionError;

/// Failures a lifecycle task cannot absorb into a state transition
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The addon's provider could not be resolved. The failure transition has
    /// already been recorded when this is returned.
    #[error("could not resolve provider for addon {addon_id}: {source}")]
    ProviderResolution {
        addon_id: String,
        #[source]
        source: ConfigurationError,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("task runner is shut down")]
    RunnerClosed,
}
