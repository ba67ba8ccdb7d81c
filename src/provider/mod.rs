//! Upstream providers consumed by the report engine
//!
//! ## Table of Contents
//! - **RegionInventory**: Lists candidate regions for a project
//! - **ReleaseCatalog**: Lists platform releases and their dates
//! - **EnvironmentInventory**: Lists environments in one (project, region)
//! - **TimeSeriesSource**: Queries aligned time-series data
//! - **gcp**: REST implementation of all four against Google Cloud APIs

pub mod gcp;

use crate::error::ProviderError;
use crate::types::{ProjectId, Region};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use gcp::{GcpClient, TokenSource};

/// Result type for provider calls
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A platform release as listed by the release catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Image version id, e.g. `composer-2.9.7-airflow-2.9.3`
    pub image_version_id: String,
    /// Release date, when the catalog provides one
    pub release_date: Option<ReleaseDate>,
}

/// Calendar date as returned by the release catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDate {
    /// Year, 0 when unset
    pub year: i32,
    /// Month of year, 1-12
    pub month: u32,
    /// Day of month, 1-31
    pub day: u32,
}

/// An environment entry as listed by the environment inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEnvironment {
    /// Fully-qualified resource name
    pub name: String,
    /// Lifecycle state
    pub state: String,
    /// Image version id
    pub image_version: Option<String>,
    /// Private environment flag, absent when not configured
    pub private: Option<bool>,
    /// Creation timestamp
    pub create_time: Option<DateTime<Utc>>,
    /// Last update timestamp
    pub update_time: Option<DateTime<Utc>>,
}

impl RawEnvironment {
    /// Create an entry with only a name and state
    pub fn new(name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: state.into(),
            image_version: None,
            private: None,
            create_time: None,
            update_time: None,
        }
    }

    /// Set the image version
    pub fn with_image_version(mut self, version: impl Into<String>) -> Self {
        self.image_version = Some(version.into());
        self
    }

    /// Set the private environment flag
    pub fn with_private(mut self, private: bool) -> Self {
        self.private = Some(private);
        self
    }

    /// Set creation and update timestamps
    pub fn with_times(mut self, created: DateTime<Utc>, updated: DateTime<Utc>) -> Self {
        self.create_time = Some(created);
        self.update_time = Some(updated);
        self
    }
}

/// Per-series reduction applied by the time-series provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aligner {
    /// Number of samples
    Count,
    /// Number of samples that are true
    CountTrue,
    /// Sum of sample values
    Sum,
}

impl Aligner {
    /// API spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Aligner::Count => "ALIGN_COUNT",
            Aligner::CountTrue => "ALIGN_COUNT_TRUE",
            Aligner::Sum => "ALIGN_SUM",
        }
    }
}

/// A single-bucket query over a trailing window ending now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricQuery {
    /// Metric type, e.g. `composer.googleapis.com/environment/healthy`
    pub metric_type: String,
    /// Reduction
    pub aligner: Aligner,
    /// Window length, also used as the alignment period
    pub window: Duration,
}

impl MetricQuery {
    /// Query over the trailing 24 hours
    pub fn daily(metric_type: impl Into<String>, aligner: Aligner) -> Self {
        Self {
            metric_type: metric_type.into(),
            aligner,
            window: Duration::from_secs(24 * 3600),
        }
    }

    /// Monitoring filter expression
    pub fn filter(&self) -> String {
        format!("metric.type = \"{}\"", self.metric_type)
    }
}

/// One aligned series
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSeries {
    /// Monitored resource labels (project_id, location, ...)
    pub resource_labels: HashMap<String, String>,
    /// Metric labels (state, ...)
    pub metric_labels: HashMap<String, String>,
    /// Value of the single aligned point
    pub value: i64,
}

impl TimeSeries {
    /// Resource label by name
    pub fn resource_label(&self, name: &str) -> Option<&str> {
        self.resource_labels.get(name).map(String::as_str)
    }

    /// Metric label by name
    pub fn metric_label(&self, name: &str) -> Option<&str> {
        self.metric_labels.get(name).map(String::as_str)
    }
}

/// Lists candidate regions for a project
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegionInventory: Send + Sync {
    /// Region names in provider order
    async fn list_regions(&self, project: &ProjectId) -> ProviderResult<Vec<String>>;
}

/// Lists platform releases
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReleaseCatalog: Send + Sync {
    /// All releases, including past ones, known in a location
    async fn list_releases(
        &self,
        project: &ProjectId,
        location: &str,
    ) -> ProviderResult<Vec<Release>>;
}

/// Lists environments in one (project, region)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnvironmentInventory: Send + Sync {
    /// All environments in the region
    async fn list_environments(
        &self,
        project: &ProjectId,
        region: &Region,
    ) -> ProviderResult<Vec<RawEnvironment>>;
}

/// Queries aligned time series
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TimeSeriesSource: Send + Sync {
    /// Series matching the query, each reduced to one point
    async fn query(
        &self,
        project: &ProjectId,
        query: &MetricQuery,
    ) -> ProviderResult<Vec<TimeSeries>>;
}

/// The four providers a run needs, shared across tasks
#[derive(Clone)]
pub struct Providers {
    /// Region inventory
    pub regions: Arc<dyn RegionInventory>,
    /// Release catalog
    pub releases: Arc<dyn ReleaseCatalog>,
    /// Environment inventory
    pub environments: Arc<dyn EnvironmentInventory>,
    /// Time-series source
    pub time_series: Arc<dyn TimeSeriesSource>,
}

impl Providers {
    /// Use one client for every provider
    pub fn from_client<C>(client: C) -> Self
    where
        C: RegionInventory + ReleaseCatalog + EnvironmentInventory + TimeSeriesSource + 'static,
    {
        let client = Arc::new(client);
        Self {
            regions: client.clone(),
            releases: client.clone(),
            environments: client.clone(),
            time_series: client,
        }
    }
}
