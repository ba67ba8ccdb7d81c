//! FleetBuilder for configuring and constructing the report service
//!
//! ## Table of Contents
//! - **FleetBuilder**: Builder pattern over [`FleetConfig`]

use crate::config::{FleetConfig, SinkTarget};
use crate::engine::{EngineConfig, FleetEngine};
use crate::error::Result;
use crate::metrics::FleetMetrics;
use crate::provider::{GcpClient, Providers, TokenSource};
use crate::report::ReportRenderer;
use crate::service::FleetService;
use crate::storage::{memory_sink, BoxedReportSink, FileStore, GcsStore};
use crate::types::ProjectId;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builder for constructing FleetService instances
pub struct FleetBuilder {
    config: FleetConfig,
    providers: Option<Providers>,
    sink: Option<BoxedReportSink>,
}

impl FleetBuilder {
    /// Create a new FleetBuilder with default configuration
    pub fn new() -> Self {
        Self::from_config(FleetConfig::default())
    }

    /// Start from a loaded configuration
    pub fn from_config(config: FleetConfig) -> Self {
        Self {
            config,
            providers: None,
            sink: None,
        }
    }

    /// Set the projects to report on, in order
    pub fn with_projects<I, P>(mut self, projects: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProjectId>,
    {
        self.config.projects = projects.into_iter().map(Into::into).collect();
        self
    }

    /// Set the host project for the region and release catalogs
    pub fn with_host_project(mut self, project: impl Into<ProjectId>) -> Self {
        self.config.host_project = project.into();
        self
    }

    /// Use custom providers instead of the Google Cloud client
    pub fn with_providers(mut self, providers: Providers) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Set a custom report sink
    pub fn with_sink(mut self, sink: BoxedReportSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Store reports in a Cloud Storage bucket
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.sink = SinkTarget::Bucket(bucket.into());
        self
    }

    /// Store reports in a local directory
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.sink = SinkTarget::Directory(dir.into());
        self
    }

    /// Set the report object name
    pub fn with_report_object(mut self, name: impl Into<String>) -> Self {
        self.config.report_object = name.into();
        self
    }

    /// Set the monitoring dashboard URL
    pub fn with_dashboard(mut self, url: impl Into<String>) -> Self {
        self.config.dashboard_url = url.into();
        self
    }

    /// Set the support window in months
    pub fn with_support_months(mut self, months: u32) -> Self {
        self.config.support_months = months;
        self
    }

    /// Set the per-project collection window
    pub fn with_region_timeout(mut self, timeout: Duration) -> Self {
        self.config.region_timeout = timeout;
        self
    }

    /// Set the release catalog location
    pub fn with_catalog_location(mut self, location: impl Into<String>) -> Self {
        self.config.catalog_location = location.into();
        self
    }

    /// Set HTTP bind address
    pub fn with_http_addr(mut self, addr: &str) -> Result<Self> {
        self.config.http_config = self.config.http_config.with_addr_str(addr)?;
        Ok(self)
    }

    /// Use a static bearer token
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = Some(token.into());
        self
    }

    /// Enable or disable metrics
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.config.metrics_enabled = enabled;
        self
    }

    /// Build the service
    pub fn build(self) -> Result<FleetService> {
        self.config.validate()?;

        info!(
            projects = self.config.projects.len(),
            host = %self.config.host_project,
            "Building fleet report service"
        );

        let tokens = match &self.config.access_token {
            Some(token) => TokenSource::Static(token.clone()),
            None => TokenSource::MetadataServer,
        };
        let mut client = None;

        let providers = match self.providers {
            Some(p) => p,
            None => Providers::from_client(shared_client(&mut client, &tokens)?),
        };

        let sink: BoxedReportSink = match (self.sink, &self.config.sink) {
            (Some(s), _) => s,
            (None, SinkTarget::Bucket(bucket)) => {
                Arc::new(GcsStore::new(shared_client(&mut client, &tokens)?, bucket.clone()))
            }
            (None, SinkTarget::Directory(dir)) => Arc::new(FileStore::new(dir)),
            (None, SinkTarget::Memory) => memory_sink(),
        };

        let metrics = if self.config.metrics_enabled {
            Some(Arc::new(FleetMetrics::new()?))
        } else {
            None
        };

        let engine_config = EngineConfig::new(self.config.host_project.clone())
            .catalog_location(self.config.catalog_location.clone())
            .collection_window(self.config.region_timeout);
        let mut engine = FleetEngine::new(providers, engine_config);
        if let Some(m) = &metrics {
            engine = engine.with_metrics(Arc::clone(m));
        }

        info!(sink = sink.name(), object = %self.config.report_object, "Report sink selected");

        Ok(FleetService::new(
            engine,
            ReportRenderer::new(self.config.dashboard_url),
            sink,
            self.config.projects,
            self.config.support_months,
            self.config.report_object,
            self.config.http_config,
            metrics,
        ))
    }
}

/// One client for providers and sink, created on first use
fn shared_client(cached: &mut Option<GcpClient>, tokens: &TokenSource) -> Result<GcpClient> {
    if let Some(client) = cached {
        return Ok(client.clone());
    }
    let client = GcpClient::new(tokens.clone())?;
    *cached = Some(client.clone());
    Ok(client)
}

impl Default for FleetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FleetError;

    #[test]
    fn test_builder_requires_projects() {
        let err = FleetBuilder::new().with_host_project("host").build().err().unwrap();
        assert!(matches!(err, FleetError::Config(_)));

        let err = FleetBuilder::new().with_projects(["p1"]).build().err().unwrap();
        assert!(matches!(err, FleetError::Config(_)));
    }

    #[test]
    fn test_builder_default_sink() {
        let service = FleetBuilder::new()
            .with_projects(["p1", "p2"])
            .with_host_project("host")
            .with_access_token("token")
            .build()
            .unwrap();
        assert_eq!(service.sink().name(), "memory");
        assert_eq!(service.projects().len(), 2);
        assert!(service.metrics().is_some());
    }

    #[test]
    fn test_builder_sinks() {
        let service = FleetBuilder::new()
            .with_projects(["p1"])
            .with_host_project("host")
            .with_access_token("token")
            .with_bucket("reports")
            .build()
            .unwrap();
        assert_eq!(service.sink().name(), "gcs");

        let dir = tempfile::tempdir().unwrap();
        let service = FleetBuilder::new()
            .with_projects(["p1"])
            .with_host_project("host")
            .with_access_token("token")
            .with_report_dir(dir.path())
            .with_metrics(false)
            .build()
            .unwrap();
        assert_eq!(service.sink().name(), "file");
        assert!(service.metrics().is_none());
    }

    #[test]
    fn test_builder_from_config() {
        let config = FleetConfig::from_lookup(|key| match key {
            "PROJECTS" => Some("a,b,c".to_string()),
            "PROJECT_ID" => Some("host".to_string()),
            "REGION_TIMEOUT_SECS" => Some("2".to_string()),
            _ => None,
        })
        .unwrap();

        let service = FleetBuilder::from_config(config)
            .with_access_token("token")
            .build()
            .unwrap();
        assert_eq!(service.projects().len(), 3);
    }
}
