//! TigerHost addon lifecycle service.
//!
//! Re-exports the workspace crates and wires them together from an
//! [`AppConfig`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tigerhost_addons::{config::AppConfig, orchestrator::InMemoryTokenSource, AddonService};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = AppConfig::default();
//! let service = AddonService::from_config(&config, Arc::new(InMemoryTokenSource::new())).await?;
//! let _handle = service.runner().submit_provision("addon-1");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use anyhow::Context;
use tigerhost_addons_config::AppConfig;
use tigerhost_addons_metrics::MetricsCollector;
use tigerhost_addons_orchestrator::{
    AddonOrchestrator, HttpBackendResolver, RetryPolicy, TaskRunner, TokenSource, WorkflowHandle,
};
use tigerhost_addons_providers::ProviderRegistry;
use tigerhost_addons_state::{AddonStore, SqliteStore, StateMachineManager};
use tigerhost_addons_types::{Addon, AddonState};
use tracing::{info, warn};

pub use tigerhost_addons_config as config;
pub use tigerhost_addons_metrics as metrics;
pub use tigerhost_addons_orchestrator as orchestrator;
pub use tigerhost_addons_providers as providers;
pub use tigerhost_addons_state as state;
pub use tigerhost_addons_types as types;

/// Page size used when listing addons to resume
const RESUME_PAGE_SIZE: usize = 500;

/// States whose addons are picked up again by [`AddonService::resume_pending`]
const RESUMABLE_STATES: [AddonState; 4] = [
    AddonState::AwaitingProvisionStart,
    AddonState::WaitingForProvision,
    AddonState::Provisioned,
    AddonState::Deprovisioning,
];

/// A fully wired addon service
pub struct AddonService {
    runner: TaskRunner<dyn AddonStore>,
    metrics: Arc<MetricsCollector>,
    can_set_config: bool,
    resume_page_size: usize,
}

impl AddonService {
    /// Build the store, provider registry, backend resolver, orchestrator and
    /// runner described by `config`.
    pub async fn from_config(
        config: &AppConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> anyhow::Result<Self> {
        let store: Arc<dyn AddonStore> = Arc::new(
            SqliteStore::connect(&config.store.database_url, config.store.max_connections)
                .await
                .context("failed to open addon store")?,
        );
        Self::with_store(config, store, tokens)
    }

    /// Same as [`AddonService::from_config`] but over an existing store.
    pub fn with_store(
        config: &AppConfig,
        store: Arc<dyn AddonStore>,
        tokens: Arc<dyn TokenSource>,
    ) -> anyhow::Result<Self> {
        let providers = ProviderRegistry::from_config(&config.providers)
            .context("failed to build provider registry")?;
        let resolver = HttpBackendResolver::from_config(&config.backends, tokens)
            .context("failed to build backend clients")?
            .with_default_backend(config.service.default_backend.clone());
        let can_set_config = resolver.has_credentials();
        if !can_set_config {
            warn!("No backend tokens configured; config propagation will fail");
        }

        let metrics = Arc::new(MetricsCollector::new());
        let manager = Arc::new(StateMachineManager::new(store));
        let orchestrator =
            AddonOrchestrator::new(manager, Arc::new(providers), Arc::new(resolver))
                .with_retry_policy(RetryPolicy::from_config(&config.tasks))
                .with_metrics(metrics.clone());

        info!(
            providers = config.providers.len(),
            backends = config.backends.len(),
            "Addon service ready"
        );

        Ok(Self {
            runner: TaskRunner::new(Arc::new(orchestrator), &config.tasks),
            metrics,
            can_set_config,
            resume_page_size: RESUME_PAGE_SIZE,
        })
    }

    /// Number of addons read per store query while resuming
    pub fn with_resume_page_size(mut self, page_size: usize) -> Self {
        self.resume_page_size = page_size.max(1);
        self
    }

    pub fn runner(&self) -> &TaskRunner<dyn AddonStore> {
        &self.runner
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Resubmit work for addons left mid-workflow, e.g. after a restart.
    ///
    /// Every resumable addon is listed before any workflow starts, so an
    /// addon moving on to the next state is not submitted twice. Provisioned
    /// addons are left alone while no backend credentials are configured.
    pub async fn resume_pending(&self) -> anyhow::Result<Vec<WorkflowHandle>> {
        let mut pending = Vec::with_capacity(RESUMABLE_STATES.len());
        for state in RESUMABLE_STATES {
            pending.push((state, self.list_all(state).await?));
        }

        let mut handles = Vec::new();
        for (state, addons) in pending {
            if addons.is_empty() {
                continue;
            }
            if state == AddonState::Provisioned && !self.can_set_config {
                warn!(
                    count = addons.len(),
                    "Leaving provisioned addons until backend credentials are configured"
                );
                continue;
            }
            info!(state = %state, count = addons.len(), "Resuming addons");

            for addon in addons {
                let handle = match state {
                    AddonState::AwaitingProvisionStart => self.runner.submit_provision(addon.id),
                    AddonState::WaitingForProvision => {
                        self.runner.submit_check_provision(addon.id)
                    }
                    AddonState::Provisioned => self.runner.submit_set_config(addon.id),
                    _ => self.runner.submit_resume_deprovision(addon.id),
                };
                handles.push(handle);
            }
        }

        Ok(handles)
    }

    async fn list_all(&self, state: AddonState) -> anyhow::Result<Vec<Addon>> {
        let store = self.runner.orchestrator().manager().store();
        let mut addons = Vec::new();
        loop {
            let page = store
                .list_by_state(state, addons.len(), self.resume_page_size)
                .await
                .with_context(|| format!("failed to list addons in {state}"))?;
            let last_page = page.len() < self.resume_page_size;
            addons.extend(page);
            if last_page {
                return Ok(addons);
            }
        }
    }

    /// Stop handing out worker permits
    pub fn shutdown(&self) {
        self.runner.shutdown();
    }
}
