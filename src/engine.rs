//! Aggregation engine: discovery, fan-out and merge across projects
//!
//! ## Table of Contents
//! - **EngineConfig**: Host project, catalog location, collection window
//! - **FleetEngine**: Runs one report cycle over a list of projects
//! - **RegionOutcome**: Accounted result of one region task
//! - **FleetSnapshot**: Engine output handed to the renderer
//!
//! Projects are processed one at a time, in order. For each project the
//! engine fetches both metric tables, lists every candidate region
//! concurrently, then merges. Regions found unusable while processing a
//! project are dropped from the candidate list starting with the next one.

use crate::catalog;
use crate::enumerator::{self, RegionListing};
use crate::error::Result;
use crate::metrics::{FleetMetrics, Timer};
use crate::provider::Providers;
use crate::ratios;
use crate::types::{
    EnvironmentRecord, FailureSet, MetricRatioTable, ProjectId, Region, RegionExclusionSet,
    VersionSupport,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinSet};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Project the region and release catalogs are read from
    pub host_project: ProjectId,
    /// Location whose release catalog is used for support data
    pub catalog_location: String,
    /// How long to wait for a project's region tasks before aborting the rest
    pub collection_window: Duration,
}

impl EngineConfig {
    /// Create a config for a host project with default location and window
    pub fn new(host_project: impl Into<ProjectId>) -> Self {
        Self {
            host_project: host_project.into(),
            catalog_location: "us-central1".to_string(),
            collection_window: Duration::from_secs(5),
        }
    }

    /// Set the catalog location
    pub fn catalog_location(mut self, location: impl Into<String>) -> Self {
        self.catalog_location = location.into();
        self
    }

    /// Set the collection window
    pub fn collection_window(mut self, window: Duration) -> Self {
        self.collection_window = window;
        self
    }
}

/// What happened to one region task
#[derive(Debug, Clone, PartialEq)]
pub enum RegionOutcome {
    /// Environments listed
    Listed(Vec<EnvironmentRecord>),
    /// Authorization denied
    AccessDenied {
        /// What to do about it
        remediation: String,
    },
    /// Region not offered for the project
    RegionUnavailable {
        /// Upstream message
        reason: String,
    },
    /// Listing failed for another reason
    Failed(String),
    /// Still running when the collection window closed; aborted
    TimedOut,
    /// The task panicked
    Panicked,
}

impl RegionOutcome {
    /// Label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            RegionOutcome::Listed(_) => "listed",
            RegionOutcome::AccessDenied { .. } => "access_denied",
            RegionOutcome::RegionUnavailable { .. } => "region_unavailable",
            RegionOutcome::Failed(_) => "failed",
            RegionOutcome::TimedOut => "timed_out",
            RegionOutcome::Panicked => "panicked",
        }
    }
}

impl From<Result<RegionListing>> for RegionOutcome {
    fn from(listing: Result<RegionListing>) -> Self {
        match listing {
            Ok(RegionListing::Environments(records)) => RegionOutcome::Listed(records),
            Ok(RegionListing::AccessDenied { remediation, .. }) => {
                RegionOutcome::AccessDenied { remediation }
            }
            Ok(RegionListing::RegionUnavailable { reason, .. }) => {
                RegionOutcome::RegionUnavailable { reason }
            }
            Err(e) => RegionOutcome::Failed(e.to_string()),
        }
    }
}

/// Both metric tables for one project
#[derive(Debug, Clone, Default)]
pub struct ProjectMetrics {
    /// Health percentages
    pub health: MetricRatioTable,
    /// Run-success percentages
    pub runs: MetricRatioTable,
}

/// Engine output for one run
#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    /// Run identifier, for correlating logs
    pub run_id: Uuid,
    /// When the run started
    pub generated_at: DateTime<Utc>,
    /// Every environment found, in merge order
    pub environments: Vec<EnvironmentRecord>,
    /// Projects that could not be fully read
    pub failures: FailureSet,
    /// Regions dropped from the candidate list during the run
    pub excluded_regions: Vec<Region>,
}

/// Runs report cycles
pub struct FleetEngine {
    providers: Providers,
    config: EngineConfig,
    metrics: Option<Arc<FleetMetrics>>,
}

impl FleetEngine {
    /// Create a new engine
    pub fn new(providers: Providers, config: EngineConfig) -> Self {
        Self {
            providers,
            config,
            metrics: None,
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Arc<FleetMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one cycle over `projects`, in order.
    ///
    /// Fails only when a run-wide catalog cannot be read. Everything else is
    /// recorded in the snapshot's failure set.
    pub async fn run(
        &self,
        projects: &[ProjectId],
        support_window_months: u32,
    ) -> Result<FleetSnapshot> {
        let timer = Timer::start();
        let result = self.run_at(projects, support_window_months, Utc::now()).await;

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(snapshot) => metrics.record_run(
                    snapshot.environments.len(),
                    snapshot.failures.len(),
                    timer.elapsed_secs(),
                ),
                Err(_) => metrics.record_aborted_run(),
            }
        }

        result
    }

    async fn run_at(
        &self,
        projects: &[ProjectId],
        support_window_months: u32,
        now: DateTime<Utc>,
    ) -> Result<FleetSnapshot> {
        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, projects = projects.len(), "Starting fleet report run");

        let host = &self.config.host_project;
        let mut baseline = catalog::list_regions(self.providers.regions.as_ref(), host).await?;
        let versions = Arc::new(
            catalog::list_version_support(
                self.providers.releases.as_ref(),
                host,
                &self.config.catalog_location,
                support_window_months,
                now.date_naive(),
            )
            .await?,
        );

        let mut environments = Vec::new();
        let mut failures = FailureSet::new();
        let mut excluded_regions = Vec::new();

        for project in projects {
            let timer = Timer::start();
            let candidates = baseline.clone();

            let metrics = self.fetch_metrics(project, &mut failures).await;
            let outcomes = self.fan_out(project, &candidates, &versions, now).await;
            let before = environments.len();
            let excluded =
                merge_project(project, outcomes, &metrics, &mut environments, &mut failures);

            if !excluded.is_empty() {
                baseline.retain(|r| !excluded.contains(r));
                info!(
                    project = %project,
                    excluded = ?excluded,
                    remaining = baseline.len(),
                    "Regions excluded for later projects"
                );
                excluded_regions.extend(excluded);
            }

            info!(
                run_id = %run_id,
                project = %project,
                regions = candidates.len(),
                environments = environments.len() - before,
                elapsed_secs = timer.elapsed_secs(),
                "Project processed"
            );
        }

        info!(
            run_id = %run_id,
            environments = environments.len(),
            failed_projects = failures.len(),
            "Fleet report run finished"
        );

        Ok(FleetSnapshot {
            run_id,
            generated_at: now,
            environments,
            failures,
            excluded_regions,
        })
    }

    /// Fetch both tables concurrently. A failed fetch leaves its table empty.
    async fn fetch_metrics(
        &self,
        project: &ProjectId,
        failures: &mut FailureSet,
    ) -> ProjectMetrics {
        let source = self.providers.time_series.as_ref();
        let (health, runs) = futures::future::join(
            ratios::health_ratios(source, project),
            ratios::run_success_ratios(source, project),
        )
        .await;

        let mut metrics = ProjectMetrics::default();
        for (table, result) in [(&mut metrics.health, health), (&mut metrics.runs, runs)] {
            match result {
                Ok(t) => *table = t,
                Err(e) => {
                    warn!(
                        project = %project,
                        error = %e,
                        "Failed to read Cloud Monitoring metrics"
                    );
                    failures.record(project, metrics_remediation(project));
                    if let Some(m) = &self.metrics {
                        m.record_metric_fetch_failure();
                    }
                }
            }
        }
        metrics
    }

    /// List every region concurrently and account for each task.
    ///
    /// Tasks still running when the collection window closes are aborted and
    /// reported as [`RegionOutcome::TimedOut`].
    async fn fan_out(
        &self,
        project: &ProjectId,
        regions: &[Region],
        versions: &Arc<VersionSupport>,
        now: DateTime<Utc>,
    ) -> Vec<(Region, RegionOutcome)> {
        let mut tasks = JoinSet::new();
        let mut task_regions: HashMap<task::Id, Region> = HashMap::with_capacity(regions.len());
        for region in regions {
            let inventory = Arc::clone(&self.providers.environments);
            let versions = Arc::clone(versions);
            let project = project.clone();
            let task_region = region.clone();
            let handle = tasks.spawn(async move {
                let listing = enumerator::list_environments(
                    inventory.as_ref(),
                    &project,
                    &task_region,
                    &versions,
                    now,
                )
                .await;
                RegionOutcome::from(listing)
            });
            task_regions.insert(handle.id(), region.clone());
        }

        let mut outcomes = Vec::with_capacity(regions.len());
        let deadline = tokio::time::Instant::now() + self.config.collection_window;
        let mut window_closed = false;

        loop {
            let joined = if window_closed {
                tasks.join_next_with_id().await
            } else {
                match tokio::time::timeout_at(deadline, tasks.join_next_with_id()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(
                            project = %project,
                            remaining = tasks.len(),
                            window = ?self.config.collection_window,
                            "Collection window closed, aborting remaining region tasks"
                        );
                        tasks.abort_all();
                        window_closed = true;
                        continue;
                    }
                }
            };

            let (id, outcome) = match joined {
                Some(Ok((id, outcome))) => (id, outcome),
                Some(Err(e)) if e.is_panic() => {
                    error!(project = %project, error = %e, "Region task panicked");
                    (e.id(), RegionOutcome::Panicked)
                }
                Some(Err(e)) => (e.id(), RegionOutcome::TimedOut),
                None => break,
            };
            if let Some(region) = task_regions.remove(&id) {
                outcomes.push((region, outcome));
            }
        }

        if let Some(metrics) = &self.metrics {
            for (_, outcome) in &outcomes {
                metrics.record_region_task(outcome.label());
            }
        }

        outcomes
    }
}

/// Merge one project's region outcomes into the run.
///
/// Returns the regions that should be excluded from later projects.
pub fn merge_project(
    project: &ProjectId,
    outcomes: Vec<(Region, RegionOutcome)>,
    metrics: &ProjectMetrics,
    environments: &mut Vec<EnvironmentRecord>,
    failures: &mut FailureSet,
) -> RegionExclusionSet {
    let mut excluded = RegionExclusionSet::new();

    for (region, outcome) in outcomes {
        match outcome {
            RegionOutcome::Listed(records) => {
                environments.extend(records.into_iter().map(|mut record| {
                    record.enrich(&metrics.health, &metrics.runs);
                    record
                }));
            }
            RegionOutcome::AccessDenied { remediation } => {
                failures.record(project, remediation);
            }
            RegionOutcome::RegionUnavailable { reason } => {
                info!(project = %project, region = %region, reason = %reason, "Region unavailable");
                excluded.insert(region);
            }
            RegionOutcome::Failed(msg) => {
                failures.record(
                    project,
                    format!("Listing environments in {} failed: {}", region, msg),
                );
            }
            RegionOutcome::TimedOut => {
                failures.record(
                    project,
                    format!("Listing environments in {} did not finish in time", region),
                );
            }
            RegionOutcome::Panicked => {
                failures.record(
                    project,
                    format!("Listing environments in {} failed unexpectedly", region),
                );
            }
        }
    }

    excluded
}

/// Remediation hint for a monitoring read failure
pub fn metrics_remediation(project: &ProjectId) -> String {
    format!(
        "Error reading Cloud Monitoring metrics from project {}. Grant the Monitoring Viewer role \
         in this project to the service account running the report.",
        project
    )
}
