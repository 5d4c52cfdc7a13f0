use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    // ═══════════════════════════════════════════════════════════════════════════
    // TASK METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Lifecycle tasks run, by task and outcome
    pub static ref TASKS_RUN: IntCounterVec = register_int_counter_vec!(
        "tigerhost_addons_tasks_total",
        "Total lifecycle tasks run by task and outcome",
        &["task", "outcome"]
    )
    .unwrap();

    /// Task execution latency (in milliseconds)
    pub static ref TASK_DURATION: HistogramVec = register_histogram_vec!(
        "tigerhost_addons_task_duration_ms",
        "Lifecycle task duration in milliseconds",
        &["task"],
        vec![5.0, 25.0, 100.0, 250.0, 1000.0, 5000.0, 30000.0]
    )
    .unwrap();

    /// Provision polls rescheduled because the resource was not ready
    pub static ref RESCHEDULES: IntCounter = register_int_counter!(
        "tigerhost_addons_reschedules_total",
        "Total provision polls rescheduled"
    )
    .unwrap();

    /// Tasks currently waiting on a reschedule timer
    pub static ref PENDING_POLLS: IntGauge = register_int_gauge!(
        "tigerhost_addons_pending_polls",
        "Provision polls waiting on a reschedule timer"
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Committed state transitions by event
    pub static ref TRANSITIONS: IntCounterVec = register_int_counter_vec!(
        "tigerhost_addons_transitions_total",
        "Total committed state transitions by event",
        &["event"]
    )
    .unwrap();

    /// Time from provision start until the addon's config was stored (in seconds)
    pub static ref PROVISION_DURATION: Histogram = register_histogram!(
        "tigerhost_addons_provision_duration_secs",
        "Provisioning duration in seconds",
        vec![1.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // FAILURE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Errors reported by providers
    pub static ref PROVIDER_ERRORS: IntCounterVec = register_int_counter_vec!(
        "tigerhost_addons_provider_errors_total",
        "Total provider errors by provider",
        &["provider"]
    )
    .unwrap();

    /// Errors from PaaS backends while propagating config
    pub static ref BACKEND_ERRORS: IntCounterVec = register_int_counter_vec!(
        "tigerhost_addons_backend_errors_total",
        "Total backend errors by backend",
        &["backend"]
    )
    .unwrap();

    /// ERROR level log events by target
    pub static ref ERROR_EVENTS: IntCounterVec = register_int_counter_vec!(
        "tigerhost_addons_error_events_total",
        "Total error log events by target",
        &["target"]
    )
    .unwrap();
}
