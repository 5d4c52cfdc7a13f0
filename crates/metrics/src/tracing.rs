use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::collector::{MetricsCollector, TaskKind};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,tigerhost_addons=debug";

/// Initialize tracing with metrics integration
///
/// `default_level` is used in place of [`DEFAULT_FILTER`] when given (the
/// `service.log_level` config value); `RUST_LOG` still wins over both.
pub fn init_tracing_with_metrics(
    collector: Arc<MetricsCollector>,
    default_level: Option<&str>,
) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| match default_level {
            Some(level) => EnvFilter::try_new(level),
            None => EnvFilter::try_new(DEFAULT_FILTER),
        })
        .map_err(|e| TracingError::InitError(e.to_string()))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .json();

    let metrics_layer = MetricsLayer::new(collector);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(metrics_layer)
        .try_init()
        .map_err(|e| TracingError::InitError(e.to_string()))?;

    Ok(())
}

/// Tracing layer that counts ERROR events by target
pub struct MetricsLayer {
    collector: Arc<MetricsCollector>,
}

impl MetricsLayer {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for MetricsLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() == Level::ERROR {
            self.collector.record_error_event(metadata.target());
        }
    }
}

/// Correlation ID tying together the tasks of one addon workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(uuid::Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Span context for one lifecycle task run
#[derive(Debug, Clone)]
pub struct AddonSpan {
    pub correlation_id: CorrelationId,
    pub addon_id: String,
    pub task: TaskKind,
}

impl AddonSpan {
    pub fn new(addon_id: impl Into<String>, task: TaskKind) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            addon_id: addon_id.into(),
            task,
        }
    }

    /// Keep the correlation id of an earlier task in the same workflow
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Span to instrument the task future with
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "addon_task",
            correlation_id = %self.correlation_id,
            addon_id = %self.addon_id,
            task = %self.task,
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("tracing initialization error: {0}")]
    InitError(String),
}
