use thiserror::Error;
use tigerhost_addons_types::{AddonEvent, AddonState};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("addon not found: {0}")]
    NotFound(String),

    #[error("duplicate addon ID: {0}")]
    DuplicateId(String),

    /// The stored state no longer matches the state the write was based on
    #[error("addon {id} is no longer in state {expected}")]
    Conflict { id: String, expected: AddonState },

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("event {event} cannot be applied to addon {addon_id} in state {current}")]
    InvalidTransition {
        addon_id: String,
        event: AddonEvent,
        current: AddonState,
    },

    #[error("addon not found: {0}")]
    NotFound(String),

    #[error("field {0} cannot be modified")]
    ImmutableField(&'static str),

    #[error("addon invariant violated: {0}")]
    InvariantViolation(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl TransitionError {
    /// Stale or duplicate work: the addon is not where the caller expected
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, TransitionError::InvalidTransition { .. })
    }
}
