//! Report service: one full cycle per trigger
//!
//! ## Table of Contents
//! - **FleetService**: Runs the engine, renders and stores the report
//! - **ReportOutcome**: What a triggered cycle produced
//! - **RunSummary**: Last cycle, for the health endpoint

use crate::engine::FleetEngine;
use crate::error::Result;
use crate::metrics::FleetMetrics;
use crate::networking::{router, HttpServer, HttpServerConfig};
use crate::report::ReportRenderer;
use crate::storage::BoxedReportSink;
use crate::types::ProjectId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// What a completed cycle produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Report rendered and stored
    Regenerated,
    /// Report rendered but the sink refused it
    StoreFailed(String),
}

impl fmt::Display for ReportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportOutcome::Regenerated => f.write_str("Report regenerated"),
            ReportOutcome::StoreFailed(e) => write!(f, "Error saving a report: {}", e),
        }
    }
}

/// Summary of the last completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Run identifier
    pub run_id: Uuid,
    /// When the run started
    pub generated_at: DateTime<Utc>,
    /// Environments in the report
    pub environments: usize,
    /// Projects that could not be fully read
    pub failed_projects: usize,
    /// Whether the report reached the sink
    pub stored: bool,
}

/// Fleet report service
pub struct FleetService {
    engine: FleetEngine,
    renderer: ReportRenderer,
    sink: BoxedReportSink,
    projects: Vec<ProjectId>,
    support_months: u32,
    report_object: String,
    http_config: HttpServerConfig,
    metrics: Option<Arc<FleetMetrics>>,

    started: Instant,
    last_run: RwLock<Option<RunSummary>>,
    // one cycle at a time
    run_lock: Mutex<()>,
    shutdown_tx: broadcast::Sender<()>,
}

impl FleetService {
    /// Create a new service (use FleetBuilder instead)
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        engine: FleetEngine,
        renderer: ReportRenderer,
        sink: BoxedReportSink,
        projects: Vec<ProjectId>,
        support_months: u32,
        report_object: String,
        http_config: HttpServerConfig,
        metrics: Option<Arc<FleetMetrics>>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            engine,
            renderer,
            sink,
            projects,
            support_months,
            report_object,
            http_config,
            metrics,
            started: Instant::now(),
            last_run: RwLock::new(None),
            run_lock: Mutex::new(()),
            shutdown_tx,
        }
    }

    /// Projects covered by each report
    pub fn projects(&self) -> &[ProjectId] {
        &self.projects
    }

    /// Get metrics instance
    pub fn metrics(&self) -> Option<&Arc<FleetMetrics>> {
        self.metrics.as_ref()
    }

    /// Get the report sink
    pub fn sink(&self) -> &BoxedReportSink {
        &self.sink
    }

    /// Seconds since the service was created
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Last completed cycle
    pub fn last_run(&self) -> Option<RunSummary> {
        self.last_run.read().clone()
    }

    /// Run one full cycle.
    ///
    /// Fails only when the engine cannot run at all. A report that renders
    /// but cannot be stored is an [`ReportOutcome::StoreFailed`].
    pub async fn run_report(&self) -> Result<ReportOutcome> {
        let _guard = self.run_lock.lock().await;

        let snapshot = self.engine.run(&self.projects, self.support_months).await?;
        let html = self.renderer.render(&snapshot);

        let outcome = match self.sink.store(&self.report_object, &html).await {
            Ok(()) => {
                info!(
                    run_id = %snapshot.run_id,
                    sink = self.sink.name(),
                    object = %self.report_object,
                    bytes = html.len(),
                    "Report stored"
                );
                ReportOutcome::Regenerated
            }
            Err(e) => {
                error!(
                    run_id = %snapshot.run_id,
                    sink = self.sink.name(),
                    error = %e,
                    "Failed to store report"
                );
                ReportOutcome::StoreFailed(e.to_string())
            }
        };

        *self.last_run.write() = Some(RunSummary {
            run_id: snapshot.run_id,
            generated_at: snapshot.generated_at,
            environments: snapshot.environments.len(),
            failed_projects: snapshot.failures.len(),
            stored: outcome == ReportOutcome::Regenerated,
        });

        Ok(outcome)
    }

    /// Serve the HTTP trigger until shutdown or Ctrl-C
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!(
            projects = self.projects.len(),
            addr = %self.http_config.bind_addr,
            "Starting fleet report service"
        );

        let server =
            HttpServer::new(self.http_config.clone()).with_router(router(Arc::clone(&self)));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::select! {
            result = server.serve() => {
                if let Err(e) = result {
                    error!(error = %e, "HTTP server error");
                    return Err(e);
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
            }
        }

        info!("Fleet report service stopped");
        Ok(())
    }

    /// Signal shutdown
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
