//! HTTP exporter for the Prometheus endpoint and the latest report.
//!
//! Routes:
//! - `GET /metrics` - Prometheus text format
//! - `GET /report` - latest [`VitalsReport`] as JSON, 204 before the first one
//! - `GET /health` - liveness

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::session::VitalsReport;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Exporter errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Exporter settings.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    pub bind_addr: SocketAddr,
    /// Allow browser dashboards on other origins to read the endpoints.
    pub cors: bool,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self::with_port(9090)
    }
}

impl MetricsServerConfig {
    /// Listens on all interfaces at `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
            cors: true,
        }
    }

    /// Listens on the loopback interface only.
    pub fn localhost(port: u16) -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], port).into(),
            cors: false,
        }
    }
}

/// State shared between the sample loop and the HTTP handlers.
pub struct MetricsState {
    registry: MetricsRegistry,
    latest: Option<VitalsReport>,
    published: u64,
}

impl MetricsState {
    fn new(registry: MetricsRegistry) -> Self {
        Self {
            registry,
            latest: None,
            published: 0,
        }
    }

    /// Updates the gauges only.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.registry.update(snapshot);
    }

    /// Updates the gauges and keeps the report for `/report`.
    pub fn publish(&mut self, report: &VitalsReport) {
        self.registry.update(&MetricsSnapshot::from_report(report));
        self.latest = Some(report.clone());
        self.published += 1;
    }

    /// Number of reports published so far.
    pub fn published(&self) -> u64 {
        self.published
    }
}

type SharedState = Arc<RwLock<MetricsState>>;

/// HTTP exporter around a [`MetricsRegistry`].
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: SharedState,
}

impl MetricsServer {
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(MetricsState::new(registry))),
        }
    }

    /// Handle for publishing from outside the server task.
    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Builds the router without binding a socket.
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/report", get(report_handler))
            .route("/health", get(|| async { "OK" }))
            .with_state(self.state());

        if self.config.cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Serves until the process exits.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Metrics server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))
    }
}

async fn metrics_handler(State(state): State<SharedState>) -> Response {
    let state = state.read().await;
    match state.registry.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn report_handler(State(state): State<SharedState>) -> Response {
    let state = state.read().await;
    match &state.latest {
        Some(report) => Json(report.clone()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        let config = MetricsServerConfig::default();
        assert_eq!(config.bind_addr.port(), 9090);
        assert!(config.cors);
    }

    #[test]
    fn test_localhost_binds_loopback() {
        let config = MetricsServerConfig::localhost(8080);
        assert!(config.bind_addr.ip().is_loopback());
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn test_publish_keeps_latest_report() {
        let server = MetricsServer::new(
            MetricsServerConfig::default(),
            MetricsRegistry::new().unwrap(),
        );
        let state = server.state();

        let report = VitalsReport {
            samples_total: 42,
            ..Default::default()
        };
        state.blocking_write().publish(&report);

        let guard = state.blocking_read();
        assert_eq!(guard.published(), 1);
        assert_eq!(guard.latest.as_ref().map(|r| r.samples_total), Some(42));
        assert!(guard
            .registry
            .encode()
            .unwrap()
            .contains("rppg_session_samples 42"));
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let server = MetricsServer::new(
            MetricsServerConfig::localhost(0),
            MetricsRegistry::new().unwrap(),
        );
        let result = server.run_until(async {}).await;
        assert!(result.is_ok());
    }
}
