//! Health and run-success ratios from time-series data
//!
//! ## Table of Contents
//! - **health_ratios**: Share of the last 24h each environment reported healthy
//! - **run_success_ratios**: Share of workflow runs that succeeded in the last 24h
//! - **HEARTBEAT_WORKFLOW**: Internal workflow left out of run-success figures

use crate::error::{FleetError, Result};
use crate::provider::{Aligner, MetricQuery, TimeSeries, TimeSeriesSource};
use crate::types::{EnvironmentKey, MetricRatioTable, ProjectId};
use std::collections::HashMap;
use tracing::{debug, info};

/// Boolean health gauge, one sample per probe
pub const HEALTH_METRIC: &str = "composer.googleapis.com/environment/healthy";

/// Workflow run counter, labelled with the run's final state
pub const RUN_COUNT_METRIC: &str = "composer.googleapis.com/workflow/run_count";

/// Heartbeat DAG every environment runs on its own
pub const HEARTBEAT_WORKFLOW: &str = "airflow_monitoring";

const SUCCESS_STATE: &str = "success";

/// Health percentage per environment.
///
/// Divides the count of true samples by the count of all samples.
/// Environments without samples are absent from the table.
pub async fn health_ratios(
    source: &dyn TimeSeriesSource,
    project: &ProjectId,
) -> Result<MetricRatioTable> {
    let totals = source
        .query(project, &MetricQuery::daily(HEALTH_METRIC, Aligner::Count))
        .await
        .map_err(|e| FleetError::metrics_unavailable(project.as_str(), e.to_string()))?;
    let healthy = source
        .query(project, &MetricQuery::daily(HEALTH_METRIC, Aligner::CountTrue))
        .await
        .map_err(|e| FleetError::metrics_unavailable(project.as_str(), e.to_string()))?;

    let table = MetricRatioTable::from_counts(&by_environment(&healthy), &by_environment(&totals));
    info!(project = %project, environments = table.len(), "Health ratios computed");
    Ok(table)
}

/// Run-success percentage per environment.
///
/// Runs of [`HEARTBEAT_WORKFLOW`] are ignored. Environments with no runs are
/// absent from the table; environments with runs but no successes get 0.
pub async fn run_success_ratios(
    source: &dyn TimeSeriesSource,
    project: &ProjectId,
) -> Result<MetricRatioTable> {
    let series = source
        .query(project, &MetricQuery::daily(RUN_COUNT_METRIC, Aligner::Sum))
        .await
        .map_err(|e| FleetError::metrics_unavailable(project.as_str(), e.to_string()))?;

    let mut all_runs: HashMap<EnvironmentKey, i64> = HashMap::new();
    let mut successful: HashMap<EnvironmentKey, i64> = HashMap::new();

    for s in &series {
        let Some((key, workflow)) = workflow_key(s) else {
            debug!(labels = ?s.resource_labels, "Skipping run series without a workflow name");
            continue;
        };
        if workflow == HEARTBEAT_WORKFLOW {
            continue;
        }
        *all_runs.entry(key.clone()).or_insert(0) += s.value;
        if s.metric_label("state") == Some(SUCCESS_STATE) {
            *successful.entry(key).or_insert(0) += s.value;
        }
    }

    let table = MetricRatioTable::from_counts(&successful, &all_runs);
    info!(project = %project, environments = table.len(), "Run success ratios computed");
    Ok(table)
}

/// Key from the series' `project_id`, `location` and `environment_name` labels
fn environment_key(series: &TimeSeries) -> Option<EnvironmentKey> {
    Some(EnvironmentKey::new(
        series.resource_label("project_id")?,
        series.resource_label("location")?,
        series.resource_label("environment_name")?,
    ))
}

/// Key and workflow id from a `{environment}.{workflow}[.{variant}]` workflow name
fn workflow_key(series: &TimeSeries) -> Option<(EnvironmentKey, &str)> {
    let name = series.resource_label("workflow_name")?;
    let mut parts = name.split('.');
    let family = parts.next()?;
    let workflow = parts.next()?;
    let key = EnvironmentKey::new(
        series.resource_label("project_id")?,
        series.resource_label("location")?,
        family,
    );
    Some((key, workflow))
}

fn by_environment(series: &[TimeSeries]) -> HashMap<EnvironmentKey, i64> {
    let mut counts = HashMap::new();
    for s in series {
        match environment_key(s) {
            Some(key) => {
                counts.insert(key, s.value);
            }
            None => debug!(
                labels = ?s.resource_labels,
                "Skipping health series without identity labels"
            ),
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::MockTimeSeriesSource;

    fn health_series(env: &str, value: i64) -> TimeSeries {
        TimeSeries {
            resource_labels: HashMap::from([
                ("project_id".to_string(), "p1".to_string()),
                ("location".to_string(), "us-east1".to_string()),
                ("environment_name".to_string(), env.to_string()),
            ]),
            metric_labels: HashMap::new(),
            value,
        }
    }

    fn run_series(workflow_name: &str, state: &str, value: i64) -> TimeSeries {
        TimeSeries {
            resource_labels: HashMap::from([
                ("project_id".to_string(), "p1".to_string()),
                ("location".to_string(), "us-east1".to_string()),
                ("workflow_name".to_string(), workflow_name.to_string()),
            ]),
            metric_labels: HashMap::from([("state".to_string(), state.to_string())]),
            value,
        }
    }

    fn key(env: &str) -> EnvironmentKey {
        EnvironmentKey::new("p1", "us-east1", env)
    }

    #[tokio::test]
    async fn test_health_ratios() {
        let mut source = MockTimeSeriesSource::new();
        source
            .expect_query()
            .withf(|_, q| q.aligner == Aligner::Count && q.metric_type == HEALTH_METRIC)
            .returning(|_, _| {
                Ok(vec![
                    health_series("etl", 288),
                    health_series("ml", 8),
                    health_series("idle", 0),
                ])
            });
        source
            .expect_query()
            .withf(|_, q| q.aligner == Aligner::CountTrue)
            .returning(|_, _| Ok(vec![health_series("etl", 288), health_series("ml", 1)]));

        let table = health_ratios(&source, &ProjectId::new("p1")).await.unwrap();
        assert_eq!(table.get(&key("etl")), Some(100));
        assert_eq!(table.get(&key("ml")), Some(12));
        assert!(!table.contains(&key("idle")));
    }

    #[tokio::test]
    async fn test_health_ratios_failure() {
        let mut source = MockTimeSeriesSource::new();
        source
            .expect_query()
            .returning(|_, _| Err(ProviderError::PermissionDenied("HTTP 403".into())));

        let err = health_ratios(&source, &ProjectId::new("p1")).await.unwrap_err();
        assert!(matches!(err, FleetError::MetricsUnavailable { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_run_success_ratios() {
        let mut source = MockTimeSeriesSource::new();
        source
            .expect_query()
            .withf(|_, q| q.aligner == Aligner::Sum && q.metric_type == RUN_COUNT_METRIC)
            .returning(|_, _| {
                Ok(vec![
                    run_series("etl.daily_load", "success", 9),
                    run_series("etl.daily_load", "failed", 1),
                    run_series("etl.hourly.backfill", "success", 10),
                    run_series("etl.airflow_monitoring", "failed", 50),
                    run_series("broken.nightly", "failed", 4),
                    run_series("quiet.nightly", "success", 0),
                    run_series("heartbeat_only.airflow_monitoring", "success", 144),
                    run_series("no_dot", "success", 3),
                ])
            });

        let table = run_success_ratios(&source, &ProjectId::new("p1")).await.unwrap();
        // 19 of 20, heartbeat failures ignored
        assert_eq!(table.get(&key("etl")), Some(95));
        assert_eq!(table.get(&key("broken")), Some(0));
        assert!(!table.contains(&key("quiet")));
        assert!(!table.contains(&key("heartbeat_only")));
        assert!(!table.contains(&key("no_dot")));
        assert_eq!(table.len(), 2);
    }
}
