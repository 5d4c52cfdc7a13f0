use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tigerhost_addons_metrics::{AddonSpan, MetricsCollector, TaskKind};
use tigerhost_addons_providers::{AddonProvider, ProviderError, ProviderRegistry};
use tigerhost_addons_state::{AddonStore, StateMachineManager, TransitionError};
use tigerhost_addons_types::{extract_config, Addon, AddonEvent, AddonState};
use tracing::{debug, error, info, warn, Instrument};

use crate::backend::BackendClientResolver;
use crate::propagator::ConfigPropagator;
use crate::retry::RetryPolicy;
use crate::runner::current_workflow;
use crate::OrchestratorError;

// ═══════════════════════════════════════════════════════════════════════════
// TASK RESULTS
// ═══════════════════════════════════════════════════════════════════════════

/// What a lifecycle task did
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// A success transition was committed
    Completed { state: AddonState },

    /// Nothing to do: missing addon, wrong state, or stale delivery
    Skipped { reason: String },

    /// A failure transition was committed
    Failed { state: AddonState, reason: String },

    /// The provider is not ready; run the task again after the delay
    Reschedule { after: Duration },
}

impl TaskOutcome {
    /// Metrics label
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Completed { .. } => "completed",
            TaskOutcome::Skipped { .. } => "skipped",
            TaskOutcome::Failed { .. } => "failed",
            TaskOutcome::Reschedule { .. } => "reschedule",
        }
    }
}

/// Every task hands back the addon id so tasks can be chained
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub addon_id: String,
    pub outcome: TaskOutcome,
}

impl TaskResult {
    pub fn new(addon_id: impl Into<String>, outcome: TaskOutcome) -> Self {
        Self {
            addon_id: addon_id.into(),
            outcome,
        }
    }

    pub fn completed(addon_id: impl Into<String>, state: AddonState) -> Self {
        Self::new(addon_id, TaskOutcome::Completed { state })
    }

    pub fn skipped(addon_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            addon_id,
            TaskOutcome::Skipped {
                reason: reason.into(),
            },
        )
    }

    pub fn failed(addon_id: impl Into<String>, state: AddonState, reason: impl Into<String>) -> Self {
        Self::new(
            addon_id,
            TaskOutcome::Failed {
                state,
                reason: reason.into(),
            },
        )
    }

    /// State committed by this task, if any
    pub fn state(&self) -> Option<AddonState> {
        match &self.outcome {
            TaskOutcome::Completed { state } | TaskOutcome::Failed { state, .. } => Some(*state),
            _ => None,
        }
    }
}

enum Loaded {
    Addon(Addon),
    Skip(TaskResult),
}

// ═══════════════════════════════════════════════════════════════════════════
// ORCHESTRATOR
// ═══════════════════════════════════════════════════════════════════════════

/// Runs the addon lifecycle tasks.
///
/// Each task loads the addon, checks it is in the state the task expects,
/// talks to the provider or backend, and records the result through the
/// state machine manager. Provider and backend failures end in a failure
/// transition; only provider resolution failures are returned as errors.
pub struct AddonOrchestrator<S: AddonStore + ?Sized> {
    manager: Arc<StateMachineManager<S>>,
    providers: Arc<ProviderRegistry>,
    propagator: ConfigPropagator,
    retry: RetryPolicy,
    metrics: Arc<MetricsCollector>,
}

impl<S: AddonStore + ?Sized> AddonOrchestrator<S> {
    pub fn new(
        manager: Arc<StateMachineManager<S>>,
        providers: Arc<ProviderRegistry>,
        resolver: Arc<dyn BackendClientResolver>,
    ) -> Self {
        Self {
            manager,
            providers,
            propagator: ConfigPropagator::new(resolver),
            retry: RetryPolicy::default(),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn manager(&self) -> &Arc<StateMachineManager<S>> {
        &self.manager
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TASKS
    // ═══════════════════════════════════════════════════════════════════════

    /// Ask the provider to start allocating the addon's resource.
    pub async fn start_provision(&self, addon_id: &str) -> Result<TaskResult, OrchestratorError> {
        self.instrumented(TaskKind::StartProvision, addon_id, self.run_start_provision(addon_id))
            .await
    }

    /// Poll a provision in progress and store the config once ready.
    pub async fn check_provision(&self, addon_id: &str) -> Result<TaskResult, OrchestratorError> {
        self.check_provision_attempt(addon_id, 0).await
    }

    /// `check_provision` for the zero-based poll `attempt`, which drives the
    /// backoff when the provider gives no retry hint.
    pub async fn check_provision_attempt(
        &self,
        addon_id: &str,
        attempt: u32,
    ) -> Result<TaskResult, OrchestratorError> {
        self.instrumented(
            TaskKind::CheckProvision,
            addon_id,
            self.run_check_provision(addon_id, attempt),
        )
        .await
    }

    /// Write a provisioned addon's config into its application.
    pub async fn set_config(&self, addon_id: &str) -> Result<TaskResult, OrchestratorError> {
        self.instrumented(TaskKind::SetConfig, addon_id, self.run_set_config(addon_id))
            .await
    }

    /// Mark a configured addon for deprovisioning.
    pub async fn request_deprovision(
        &self,
        addon_id: &str,
    ) -> Result<TaskResult, OrchestratorError> {
        self.instrumented(
            TaskKind::RequestDeprovision,
            addon_id,
            self.run_request_deprovision(addon_id),
        )
        .await
    }

    /// Ask the provider to tear down the addon's resource.
    pub async fn deprovision(&self, addon_id: &str) -> Result<TaskResult, OrchestratorError> {
        self.instrumented(TaskKind::Deprovision, addon_id, self.run_deprovision(addon_id))
            .await
    }

    /// Give up on a provision that never became ready.
    pub async fn abandon_provision(
        &self,
        addon_id: &str,
        reason: &str,
    ) -> Result<TaskResult, OrchestratorError> {
        match self.load(addon_id, AddonState::WaitingForProvision).await? {
            Loaded::Skip(result) => Ok(result),
            Loaded::Addon(_) => {
                error!(addon_id = %addon_id, %reason, "Abandoning provision");
                self.fail(addon_id, AddonEvent::ProvisionFailure, reason.to_string())
                    .await
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TASK BODIES
    // ═══════════════════════════════════════════════════════════════════════

    async fn run_start_provision(&self, addon_id: &str) -> Result<TaskResult, OrchestratorError> {
        let addon = match self.load(addon_id, AddonState::AwaitingProvisionStart).await? {
            Loaded::Addon(addon) => addon,
            Loaded::Skip(result) => return Ok(result),
        };

        let provider = self
            .resolve_provider(&addon, AddonEvent::ProvisionStartFailure)
            .await?;

        let Some(app) = addon.app.as_ref() else {
            return self
                .fail(
                    addon_id,
                    AddonEvent::ProvisionStartFailure,
                    "addon is not attached to an app".to_string(),
                )
                .await;
        };

        let start = match provider.begin_provision(&app.app_id).await {
            Ok(start) => start,
            Err(e) => {
                return self
                    .provider_failure(&addon, AddonEvent::ProvisionStartFailure, e)
                    .await
            }
        };

        info!(addon_id = %addon_id, provider_uuid = %start.uuid, "Provision started");
        self.commit_or_skip(addon_id, AddonEvent::SubmitProvisionRequest, move |addon| {
            addon.provider_uuid = Some(start.uuid);
            addon.message = Some(start.message);
            Ok(())
        })
        .await
    }

    async fn run_check_provision(
        &self,
        addon_id: &str,
        attempt: u32,
    ) -> Result<TaskResult, OrchestratorError> {
        let addon = match self.load(addon_id, AddonState::WaitingForProvision).await? {
            Loaded::Addon(addon) => addon,
            Loaded::Skip(result) => return Ok(result),
        };

        let provider = self
            .resolve_provider(&addon, AddonEvent::ProvisionFailure)
            .await?;

        let Some(uuid) = addon.provider_uuid else {
            return self
                .fail(
                    addon_id,
                    AddonEvent::ProvisionFailure,
                    "addon has no provider handle".to_string(),
                )
                .await;
        };

        let status = match provider.provision_complete(uuid).await {
            Ok(status) => status,
            Err(e) => {
                return self
                    .provider_failure(&addon, AddonEvent::ProvisionFailure, e)
                    .await
            }
        };

        if !status.ready {
            let after = self.retry.delay_for(status.retry_after_secs, attempt);
            self.metrics.record_reschedule();
            debug!(
                addon_id = %addon_id,
                attempt,
                delay_ms = after.as_millis() as u64,
                "Provision not ready, rescheduling"
            );
            return Ok(TaskResult::new(addon_id, TaskOutcome::Reschedule { after }));
        }

        let raw = match provider
            .get_config(uuid, addon.config_customization.as_deref())
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                return self
                    .provider_failure(&addon, AddonEvent::ProvisionFailure, e)
                    .await
            }
        };

        let config = match extract_config(&raw) {
            Ok(config) => config,
            Err(e) => {
                error!(addon_id = %addon_id, error = %e, "Provider returned invalid config");
                return self
                    .fail(
                        addon_id,
                        AddonEvent::ProvisionFailure,
                        format!("invalid config from provider: {e}"),
                    )
                    .await;
            }
        };

        let result = self
            .commit_or_skip(addon_id, AddonEvent::ProvisionSuccess, move |addon| {
                addon.config = Some(config);
                Ok(())
            })
            .await?;

        if matches!(result.outcome, TaskOutcome::Completed { .. }) {
            let elapsed = (Utc::now().timestamp() as u64).saturating_sub(addon.created_at);
            self.metrics
                .record_provision_duration(Duration::from_secs(elapsed));
        }
        Ok(result)
    }

    async fn run_set_config(&self, addon_id: &str) -> Result<TaskResult, OrchestratorError> {
        let addon = match self.load(addon_id, AddonState::Provisioned).await? {
            Loaded::Addon(addon) => addon,
            Loaded::Skip(result) => return Ok(result),
        };

        let (app, user, config) = match (&addon.app, &addon.user, &addon.config) {
            (Some(app), Some(user), Some(config)) => (app, user, config),
            (app, user, config) => {
                error!(
                    addon_id = %addon_id,
                    has_app = app.is_some(),
                    has_user = user.is_some(),
                    has_config = config.is_some(),
                    "Addon is missing data required to set config"
                );
                return self
                    .fail(
                        addon_id,
                        AddonEvent::ConfigVariablesSetFailure,
                        "addon is missing its app, user or config".to_string(),
                    )
                    .await;
            }
        };

        if let Err(e) = self.propagator.propagate(app, user, config).await {
            error!(
                addon_id = %addon_id,
                backend = %app.backend,
                error = %e,
                "Could not set config"
            );
            self.metrics.record_backend_error(&app.backend);
            return self
                .fail(
                    addon_id,
                    AddonEvent::ConfigVariablesSetFailure,
                    e.to_string(),
                )
                .await;
        }

        self.commit_or_skip(addon_id, AddonEvent::ConfigVariablesSetSuccess, |_| Ok(()))
            .await
    }

    async fn run_request_deprovision(
        &self,
        addon_id: &str,
    ) -> Result<TaskResult, OrchestratorError> {
        match self.load(addon_id, AddonState::ConfigSet).await? {
            Loaded::Skip(result) => Ok(result),
            Loaded::Addon(_) => {
                self.commit_or_skip(addon_id, AddonEvent::SubmitDeprovisionRequest, |_| Ok(()))
                    .await
            }
        }
    }

    async fn run_deprovision(&self, addon_id: &str) -> Result<TaskResult, OrchestratorError> {
        let addon = match self.load(addon_id, AddonState::Deprovisioning).await? {
            Loaded::Addon(addon) => addon,
            Loaded::Skip(result) => return Ok(result),
        };

        let provider = self
            .resolve_provider(&addon, AddonEvent::DeprovisionFailure)
            .await?;

        let Some(uuid) = addon.provider_uuid else {
            return self
                .fail(
                    addon_id,
                    AddonEvent::DeprovisionFailure,
                    "addon has no provider handle".to_string(),
                )
                .await;
        };

        let result = match provider.deprovision(uuid).await {
            Ok(result) => result,
            Err(e) => {
                return self
                    .provider_failure(&addon, AddonEvent::DeprovisionFailure, e)
                    .await
            }
        };

        self.commit_or_skip(addon_id, AddonEvent::DeprovisionSuccess, move |addon| {
            addon.message = Some(result.message);
            Ok(())
        })
        .await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════════════

    async fn instrumented<Fut>(
        &self,
        task: TaskKind,
        addon_id: &str,
        run: Fut,
    ) -> Result<TaskResult, OrchestratorError>
    where
        Fut: Future<Output = Result<TaskResult, OrchestratorError>>,
    {
        let started = Instant::now();
        // Tasks outside a runner workflow get a correlation id of their own
        let span = AddonSpan::new(addon_id, task)
            .with_correlation_id(current_workflow().unwrap_or_default());
        let result = run.instrument(span.span()).await;

        let outcome = match &result {
            Ok(result) => result.outcome.label(),
            Err(_) => "error",
        };
        self.metrics.record_task(task, outcome, started.elapsed());
        result
    }

    /// Load the addon, skipping if it is missing or not in `expected`
    async fn load(&self, addon_id: &str, expected: AddonState) -> Result<Loaded, OrchestratorError> {
        let Some(addon) = self.manager.get(addon_id).await? else {
            warn!(addon_id = %addon_id, "Addon does not exist");
            return Ok(Loaded::Skip(TaskResult::skipped(addon_id, "addon does not exist")));
        };

        if addon.state.is_terminal() {
            debug!(addon_id = %addon_id, state = %addon.state, "Addon already finished");
            return Ok(Loaded::Skip(TaskResult::skipped(
                addon_id,
                format!("addon already finished in {}", addon.state),
            )));
        }

        if addon.state != expected {
            warn!(
                addon_id = %addon_id,
                state = %addon.state,
                expected = %expected,
                "Addon state is invalid for task"
            );
            return Ok(Loaded::Skip(TaskResult::skipped(
                addon_id,
                format!("state {} is invalid for this task", addon.state),
            )));
        }

        Ok(Loaded::Addon(addon))
    }

    /// Resolve the addon's provider, recording `failure_event` if that fails
    async fn resolve_provider(
        &self,
        addon: &Addon,
        failure_event: AddonEvent,
    ) -> Result<Arc<dyn AddonProvider>, OrchestratorError> {
        match self.providers.resolve(&addon.provider_name) {
            Ok(provider) => Ok(provider),
            Err(e) => {
                error!(
                    addon_id = %addon.id,
                    provider = %addon.provider_name,
                    error = %e,
                    "Could not get provider"
                );
                // Recorded so the task is not restarted needlessly
                self.fail(&addon.id, failure_event, e.to_string()).await?;
                Err(OrchestratorError::ProviderResolution {
                    addon_id: addon.id.clone(),
                    source: e,
                })
            }
        }
    }

    async fn provider_failure(
        &self,
        addon: &Addon,
        event: AddonEvent,
        e: ProviderError,
    ) -> Result<TaskResult, OrchestratorError> {
        error!(
            addon_id = %addon.id,
            provider = %addon.provider_name,
            event = %event,
            error = %e,
            "Provider call failed"
        );
        self.metrics.record_provider_error(&addon.provider_name);
        self.fail(&addon.id, event, e.to_string()).await
    }

    /// Commit a failure event, keeping `reason` as the addon's message
    async fn fail(
        &self,
        addon_id: &str,
        event: AddonEvent,
        reason: String,
    ) -> Result<TaskResult, OrchestratorError> {
        let message = reason.clone();
        let result = self
            .commit_or_skip(addon_id, event, move |addon| {
                addon.message = Some(message);
                Ok(())
            })
            .await?;

        Ok(match result.outcome {
            TaskOutcome::Completed { state } => TaskResult::failed(addon_id, state, reason),
            _ => result,
        })
    }

    /// Commit `event`; a stale or duplicate delivery becomes `Skipped`
    async fn commit_or_skip<F>(
        &self,
        addon_id: &str,
        event: AddonEvent,
        mutate: F,
    ) -> Result<TaskResult, OrchestratorError>
    where
        F: FnOnce(&mut Addon) -> Result<(), TransitionError>,
    {
        match self.manager.transition(addon_id, event, mutate).await {
            Ok(addon) => {
                self.metrics.record_transition(event);
                Ok(TaskResult::completed(addon_id, addon.state))
            }
            Err(e @ TransitionError::InvalidTransition { .. })
            | Err(e @ TransitionError::NotFound(_)) => {
                warn!(addon_id = %addon_id, event = %event, error = %e, "Skipping stale task");
                Ok(TaskResult::skipped(addon_id, e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
