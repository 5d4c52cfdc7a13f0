pub mod backend;
pub mod error;
pub mod propagator;
pub mod retry;
pub mod runner;
pub mod tasks;


// Re-export main types
pub use backend::{
    BackendClient, BackendClientResolver, BackendError, ClientError, DeisClient,
    HttpBackendResolver, InMemoryTokenSource, TokenSource,
};
pub use error::OrchestratorError;
pub use propagator::{ConfigPropagator, PropagationError};
pub use retry::RetryPolicy;
pub use runner::{current_workflow, TaskRunner, WorkflowHandle};
pub use tasks::{AddonOrchestrator, TaskOutcome, TaskResult};
