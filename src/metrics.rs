//! Prometheus instrumentation for report runs
//!
//! ## Table of Contents
//! - **FleetMetrics**: Run and region-task counters
//! - **Timer**: Duration helper for run timing

use crate::error::{FleetError, Result};
use prometheus::{Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};

/// Core metrics for report runs
pub struct FleetMetrics {
    registry: Registry,

    /// Completed runs by result
    pub runs_total: CounterVec,
    /// Region tasks by outcome
    pub region_tasks: CounterVec,
    /// Metric fetches that failed
    pub metric_fetch_failures: Counter,
    /// Environments in the last completed run
    pub environments: Gauge,
    /// Failed projects in the last completed run
    pub failed_projects: Gauge,
    /// Wall time of a run
    pub run_duration: Histogram,
}

impl FleetMetrics {
    /// Create a new metrics instance
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let runs_total = CounterVec::new(
            Opts::new("fleetmon_runs_total", "Total report runs"),
            &["result"],
        )?;
        let region_tasks = CounterVec::new(
            Opts::new("fleetmon_region_tasks_total", "Region enumeration tasks"),
            &["outcome"],
        )?;
        let metric_fetch_failures = Counter::new(
            "fleetmon_metric_fetch_failures_total",
            "Time-series fetches that failed",
        )?;
        let environments = Gauge::new("fleetmon_environments", "Environments in the last report")?;
        let failed_projects = Gauge::new(
            "fleetmon_failed_projects",
            "Projects that could not be fully read in the last report",
        )?;
        let run_duration = Histogram::with_opts(
            HistogramOpts::new("fleetmon_run_duration_seconds", "Report run duration")
                .buckets(vec![1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        )?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(region_tasks.clone()))?;
        registry.register(Box::new(metric_fetch_failures.clone()))?;
        registry.register(Box::new(environments.clone()))?;
        registry.register(Box::new(failed_projects.clone()))?;
        registry.register(Box::new(run_duration.clone()))?;

        Ok(Self {
            registry,
            runs_total,
            region_tasks,
            metric_fetch_failures,
            environments,
            failed_projects,
            run_duration,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a region task outcome
    pub fn record_region_task(&self, outcome: &str) {
        self.region_tasks.with_label_values(&[outcome]).inc();
    }

    /// Record a failed metric fetch
    pub fn record_metric_fetch_failure(&self) {
        self.metric_fetch_failures.inc();
    }

    /// Record a finished run
    pub fn record_run(&self, environments: usize, failed_projects: usize, duration_secs: f64) {
        self.runs_total.with_label_values(&["completed"]).inc();
        self.environments.set(environments as f64);
        self.failed_projects.set(failed_projects as f64);
        self.run_duration.observe(duration_secs);
    }

    /// Record a run aborted by a fatal error
    pub fn record_aborted_run(&self) {
        self.runs_total.with_label_values(&["aborted"]).inc();
    }

    /// Gather all metrics as text
    pub fn gather_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| FleetError::Metrics(format!("Encode error: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| FleetError::Metrics(format!("UTF8 error: {}", e)))
    }
}

/// Timer for measuring operation duration
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Get elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
