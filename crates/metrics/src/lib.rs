//! Metrics and monitoring for the TigerHost addon service
//!
//! Prometheus counters for lifecycle tasks, state transitions, provider and
//! backend failures, plus tracing initialisation that feeds error events back
//! into the metrics.
//!
//! # Example
//!
//! ```no_run
//! use tigerhost_addons_metrics::{MetricsCollector, MetricsServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let collector = Arc::new(MetricsCollector::new());
//!
//!     let server = MetricsServer::new(collector.clone(), "0.0.0.0:9090".to_string());
//!     server.serve().await.unwrap();
//! }
//! ```

pub mod collector;
pub mod http;
pub mod metrics;
pub mod tracing;

pub use collector::{MetricsCollector, MetricsError, TaskKind};
pub use http::{MetricsServer, MetricsServerError};
pub use crate::tracing::{init_tracing_with_metrics, AddonSpan, CorrelationId, TracingError};
