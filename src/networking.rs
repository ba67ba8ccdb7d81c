//! HTTP trigger and operational endpoints
//!
//! ## Table of Contents
//! - **HttpServerConfig**: Bind address
//! - **HttpServer**: Axum-based HTTP server
//! - **router**: `/` trigger plus `/health`, `/ready`, `/metrics`

use crate::error::{FleetError, Result};
use crate::service::{FleetService, RunSummary};
use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Bind address
    pub bind_addr: SocketAddr,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8080).into(),
        }
    }
}

impl HttpServerConfig {
    /// Create with custom bind address
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse from string address
    pub fn with_addr_str(mut self, addr: &str) -> Result<Self> {
        let addr = addr
            .parse()
            .map_err(|e| FleetError::config(format!("Invalid address: {}", e)))?;
        Ok(self.with_addr(addr))
    }

    /// Keep the host, change the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }
}

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    /// The service behind the trigger
    pub service: Arc<FleetService>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves
    pub status: String,
    /// Crate version
    pub version: String,
    /// Seconds since start
    pub uptime_secs: u64,
    /// Last completed report cycle
    pub last_run: Option<RunSummary>,
}

/// Build the service router
pub fn router(service: Arc<FleetService>) -> Router {
    Router::new()
        .route("/", get(trigger_handler).post(trigger_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(HttpState { service })
}

/// Run one report cycle.
///
/// A fatal run error is a 500. Storage failures still answer 200 with the
/// error in the body.
pub async fn trigger_handler(State(state): State<HttpState>) -> (StatusCode, String) {
    info!("Report requested");
    match state.service.run_report().await {
        Ok(outcome) => (StatusCode::OK, outcome.to_string()),
        Err(e) => {
            error!(error = %e, "Report run failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn health_handler(State(state): State<HttpState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.service.uptime_secs(),
        last_run: state.service.last_run(),
    })
}

async fn ready_handler() -> StatusCode {
    StatusCode::OK
}

async fn metrics_handler(
    State(state): State<HttpState>,
) -> std::result::Result<String, StatusCode> {
    match state.service.metrics() {
        Some(m) => m
            .gather_text()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// HTTP server wrapper
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: HttpServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
        }
    }

    /// Set the router
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Start the server
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| FleetError::network(format!("Failed to bind: {}", e)))?;

        info!(addr = %self.config.bind_addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .await
            .map_err(|e| FleetError::network(format!("Server error: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FleetBuilder;
    use crate::service::tests::fake_providers;

    fn state(regions_ok: bool, metrics: bool) -> HttpState {
        let service = FleetBuilder::new()
            .with_projects(["p1"])
            .with_host_project("host")
            .with_providers(fake_providers(regions_ok))
            .with_metrics(metrics)
            .build()
            .unwrap();
        HttpState {
            service: Arc::new(service),
        }
    }

    #[test]
    fn test_http_config() {
        let config = HttpServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);

        let config = config.with_addr_str("127.0.0.1:3000").unwrap().with_port(3100);
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:3100");
        assert!(HttpServerConfig::default().with_addr_str("localhost").is_err());

        let config = HttpServerConfig::default().with_addr(([127, 0, 0, 1], 0).into());
        assert!(config.bind_addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_trigger_success() {
        let (status, body) = trigger_handler(State(state(true, true))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Report regenerated");
    }

    #[tokio::test]
    async fn test_trigger_fatal_error() {
        let (status, body) = trigger_handler(State(state(false, true))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("Compute Engine"));
    }

    #[tokio::test]
    async fn test_health_reports_last_run() {
        let state = state(true, true);
        assert!(health_handler(State(state.clone())).await.0.last_run.is_none());

        trigger_handler(State(state.clone())).await;
        let health = health_handler(State(state)).await.0;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.last_run.unwrap().environments, 1);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let enabled = state(true, true);
        trigger_handler(State(enabled.clone())).await;
        let text = metrics_handler(State(enabled)).await.unwrap();
        assert!(text.contains("fleetmon_runs_total"));

        let disabled = state(true, false);
        assert_eq!(metrics_handler(State(disabled)).await.unwrap_err(), StatusCode::NOT_FOUND);
    }
}
