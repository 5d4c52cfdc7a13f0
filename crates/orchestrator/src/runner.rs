use std::future::Future;
use std::sync::Arc;
use tigerhost_addons_config::TaskConfig;
use tigerhost_addons_metrics::CorrelationId;
use tigerhost_addons_state::AddonStore;
use tigerhost_addons_types::AddonState;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::tasks::{AddonOrchestrator, TaskOutcome, TaskResult};
use crate::OrchestratorError;

/// Handle to a submitted workflow; resolves to the last task's result
pub type WorkflowHandle = JoinHandle<Result<TaskResult, OrchestratorError>>;

tokio::task_local! {
    static WORKFLOW: CorrelationId;
}

/// Correlation id of the workflow the calling task runs in, if any
pub fn current_workflow() -> Option<CorrelationId> {
    WORKFLOW.try_with(|id| *id).ok()
}

/// Spawn `workflow` with a fresh correlation id shared by all its tasks
fn spawn_workflow<F>(workflow: F) -> WorkflowHandle
where
    F: Future<Output = Result<TaskResult, OrchestratorError>> + Send + 'static,
{
    let correlation_id = CorrelationId::new();
    tokio::spawn(WORKFLOW.scope(correlation_id, workflow))
}

/// Runs lifecycle workflows in the background.
///
/// A workflow chains tasks by the addon id each one returns. Tasks hold a
/// worker permit only while they run, so a provision waiting out a retry
/// delay does not block other addons.
pub struct TaskRunner<S: AddonStore + ?Sized + 'static> {
    orchestrator: Arc<AddonOrchestrator<S>>,
    permits: Arc<Semaphore>,
    max_poll_attempts: u32,
}

impl<S: AddonStore + ?Sized + 'static> Clone for TaskRunner<S> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            permits: self.permits.clone(),
            max_poll_attempts: self.max_poll_attempts,
        }
    }
}

impl<S: AddonStore + ?Sized + 'static> TaskRunner<S> {
    pub fn new(orchestrator: Arc<AddonOrchestrator<S>>, tasks: &TaskConfig) -> Self {
        Self {
            orchestrator,
            permits: Arc::new(Semaphore::new(tasks.worker_concurrency.max(1))),
            max_poll_attempts: tasks.max_poll_attempts.max(1),
        }
    }

    pub fn orchestrator(&self) -> &Arc<AddonOrchestrator<S>> {
        &self.orchestrator
    }

    /// Stop accepting work; tasks waiting for a permit fail with
    /// [`OrchestratorError::RunnerClosed`].
    pub fn shutdown(&self) {
        self.permits.close();
    }

    /// start_provision, then poll until ready, then set_config
    pub fn submit_provision(&self, addon_id: impl Into<String>) -> WorkflowHandle {
        let runner = self.clone();
        let addon_id = addon_id.into();
        spawn_workflow(async move {
            let started = {
                let _permit = runner.permit().await?;
                runner.orchestrator.start_provision(&addon_id).await?
            };
            if !reached(&started, AddonState::WaitingForProvision) {
                return Ok(started);
            }
            runner.poll_then_configure(&started.addon_id).await
        })
    }

    /// Resume a provision already waiting on its provider
    pub fn submit_check_provision(&self, addon_id: impl Into<String>) -> WorkflowHandle {
        let runner = self.clone();
        let addon_id = addon_id.into();
        spawn_workflow(async move { runner.poll_then_configure(&addon_id).await })
    }

    /// request_deprovision, then deprovision
    pub fn submit_deprovision(&self, addon_id: impl Into<String>) -> WorkflowHandle {
        let runner = self.clone();
        let addon_id = addon_id.into();
        spawn_workflow(async move {
            let requested = {
                let _permit = runner.permit().await?;
                runner.orchestrator.request_deprovision(&addon_id).await?
            };
            if !reached(&requested, AddonState::Deprovisioning) {
                return Ok(requested);
            }

            let _permit = runner.permit().await?;
            runner.orchestrator.deprovision(&requested.addon_id).await
        })
    }

    /// Retry config propagation for a provisioned addon
    pub fn submit_set_config(&self, addon_id: impl Into<String>) -> WorkflowHandle {
        let runner = self.clone();
        let addon_id = addon_id.into();
        spawn_workflow(async move {
            let _permit = runner.permit().await?;
            runner.orchestrator.set_config(&addon_id).await
        })
    }

    /// Finish a deprovision that was requested but never ran
    pub fn submit_resume_deprovision(&self, addon_id: impl Into<String>) -> WorkflowHandle {
        let runner = self.clone();
        let addon_id = addon_id.into();
        spawn_workflow(async move {
            let _permit = runner.permit().await?;
            runner.orchestrator.deprovision(&addon_id).await
        })
    }

    async fn poll_then_configure(&self, addon_id: &str) -> Result<TaskResult, OrchestratorError> {
        let polled = self.poll_until_settled(addon_id).await?;
        if !reached(&polled, AddonState::Provisioned) {
            return Ok(polled);
        }

        let _permit = self.permit().await?;
        self.orchestrator.set_config(&polled.addon_id).await
    }

    async fn poll_until_settled(&self, addon_id: &str) -> Result<TaskResult, OrchestratorError> {
        let metrics = self.orchestrator.metrics().clone();
        let mut attempt = 0;

        loop {
            let result = {
                let _permit = self.permit().await?;
                self.orchestrator
                    .check_provision_attempt(addon_id, attempt)
                    .await?
            };

            let TaskOutcome::Reschedule { after } = result.outcome else {
                return Ok(result);
            };

            attempt += 1;
            if attempt >= self.max_poll_attempts {
                warn!(addon_id = %addon_id, attempts = attempt, "Provision never became ready");
                let _permit = self.permit().await?;
                return self
                    .orchestrator
                    .abandon_provision(
                        addon_id,
                        &format!("provision not ready after {attempt} checks"),
                    )
                    .await;
            }

            debug!(addon_id = %addon_id, attempt, delay_ms = after.as_millis() as u64, "Waiting to poll");
            metrics.poll_scheduled();
            tokio::time::sleep(after).await;
            metrics.poll_fired();
        }
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>, OrchestratorError> {
        self.permits
            .acquire()
            .await
            .map_err(|_| OrchestratorError::RunnerClosed)
    }
}

fn reached(result: &TaskResult, state: AddonState) -> bool {
    matches!(result.outcome, TaskOutcome::Completed { state: s } if s == state)
}
