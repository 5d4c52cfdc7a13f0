use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::collector::MetricsCollector;

/// HTTP server for metrics endpoint
pub struct MetricsServer {
    collector: Arc<MetricsCollector>,
    addr: String,
}

impl MetricsServer {
    pub fn new(collector: Arc<MetricsCollector>, addr: String) -> Self {
        Self { collector, addr }
    }

    /// Routes served by the metrics endpoint
    pub fn router(collector: Arc<MetricsCollector>) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .with_state(collector)
    }

    /// Start the metrics HTTP server
    pub async fn serve(self) -> Result<(), MetricsServerError> {
        let app = Self::router(self.collector);

        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|e| MetricsServerError::BindError(e.to_string()))?;

        tracing::info!(addr = %self.addr, "Metrics server listening");

        axum::serve(listener, app)
            .await
            .map_err(|e| MetricsServerError::ServerError(e.to_string()))?;

        Ok(())
    }
}

/// Returns Prometheus-formatted metrics
async fn metrics_handler(
    State(collector): State<Arc<MetricsCollector>>,
) -> Result<Response, MetricsHandlerError> {
    let metrics = collector
        .export_metrics()
        .map_err(|e| MetricsHandlerError::ExportError(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics,
    )
        .into_response())
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsServerError {
    #[error("failed to bind to address: {0}")]
    BindError(String),
    #[error("server error: {0}")]
    ServerError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsHandlerError {
    #[error("failed to export metrics: {0}")]
    ExportError(String),
}

impl IntoResponse for MetricsHandlerError {
    fn into_response(self) -> Response {
        let MetricsHandlerError::ExportError(msg) = self;
        (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = MetricsServer::router(Arc::new(MetricsCollector::new()));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let collector = Arc::new(MetricsCollector::new());
        collector.record_backend_error("deis-test");
        let app = MetricsServer::router(collector);

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("backend=\"deis-test\""));
    }
}
