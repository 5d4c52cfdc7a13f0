use std::time::Duration;

use prometheus::{Encoder, TextEncoder};
use tigerhost_addons_types::AddonEvent;

use crate::metrics::*;

/// Lifecycle task kinds, used as the `task` label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    StartProvision,
    CheckProvision,
    SetConfig,
    RequestDeprovision,
    Deprovision,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::StartProvision => "start_provision",
            TaskKind::CheckProvision => "check_provision",
            TaskKind::SetConfig => "set_config",
            TaskKind::RequestDeprovision => "request_deprovision",
            TaskKind::Deprovision => "deprovision",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics collector for the addon service
///
/// All metrics live in the process-wide prometheus registry; the collector is
/// the typed entry point for recording them.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    _private: (),
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TASK METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record a finished task with its outcome label and duration
    pub fn record_task(&self, task: TaskKind, outcome: &str, duration: Duration) {
        TASKS_RUN
            .with_label_values(&[task.as_str(), outcome])
            .inc();
        TASK_DURATION
            .with_label_values(&[task.as_str()])
            .observe(duration.as_millis() as f64);
    }

    pub fn record_reschedule(&self) {
        RESCHEDULES.inc();
    }

    pub fn poll_scheduled(&self) {
        PENDING_POLLS.inc();
    }

    pub fn poll_fired(&self) {
        PENDING_POLLS.dec();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_transition(&self, event: AddonEvent) {
        TRANSITIONS.with_label_values(&[event.as_str()]).inc();
    }

    /// Record how long an addon took from provision start to stored config
    pub fn record_provision_duration(&self, duration: Duration) {
        PROVISION_DURATION.observe(duration.as_secs_f64());
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FAILURE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_provider_error(&self, provider: &str) {
        PROVIDER_ERRORS.with_label_values(&[provider]).inc();
    }

    pub fn record_backend_error(&self, backend: &str) {
        BACKEND_ERRORS.with_label_values(&[backend]).inc();
    }

    pub fn record_error_event(&self, target: &str) {
        ERROR_EVENTS.with_label_values(&[target]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPORT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Export metrics in Prometheus text format
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }
}

/// Metrics error types
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("encoding error: {0}")]
    EncodingError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new();
        assert!(collector.export_metrics().is_ok());
    }

    #[test]
    fn test_record_task_metrics() {
        let collector = MetricsCollector::new();

        collector.record_task(
            TaskKind::CheckProvision,
            "reschedule",
            Duration::from_millis(12),
        );
        collector.record_reschedule();

        let metrics = collector.export_metrics().unwrap();
        assert!(metrics.contains("tigerhost_addons_tasks_total"));
        assert!(metrics.contains("check_provision"));
        assert!(metrics.contains("tigerhost_addons_task_duration_ms"));
        assert!(metrics.contains("tigerhost_addons_reschedules_total"));
    }

    #[test]
    fn test_record_lifecycle_metrics() {
        let collector = MetricsCollector::new();

        collector.record_transition(AddonEvent::ProvisionSuccess);
        collector.record_provision_duration(Duration::from_secs(45));

        let metrics = collector.export_metrics().unwrap();
        assert!(metrics.contains("event=\"provision_success\""));
        assert!(metrics.contains("tigerhost_addons_provision_duration_secs"));
    }

    #[test]
    fn test_record_failure_metrics() {
        let collector = MetricsCollector::new();

        collector.record_provider_error("postgres");
        collector.record_backend_error("deis");

        let metrics = collector.export_metrics().unwrap();
        assert!(metrics.contains("provider=\"postgres\""));
        assert!(metrics.contains("backend=\"deis\""));
    }

    #[test]
    fn test_task_kind_labels() {
        assert_eq!(TaskKind::SetConfig.to_string(), "set_config");
        assert_eq!(TaskKind::RequestDeprovision.as_str(), "request_deprovision");
    }
}
