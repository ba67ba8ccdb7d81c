//! Service configuration loaded from environment variables
//!
//! ## Table of Contents
//! - **FleetConfig**: Complete configuration struct
//! - **SinkTarget**: Where rendered reports go
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `PROJECTS` | Comma-separated projects to report on | required |
//! | `PROJECT_ID` | Host project for the region and release catalogs | required |
//! | `BUCKET` | Cloud Storage bucket for the report | |
//! | `REPORT_DIR` | Local directory for the report, used when `BUCKET` is unset | |
//! | `REPORT_OBJECT` | Report object name | `report.html` |
//! | `MONITORING_DASHBOARD` | Dashboard linked from the report | |
//! | `SUPPORT_MONTHS` | Support window per platform release | `12` |
//! | `REGION_TIMEOUT_SECS` | Collection window per project | `5` |
//! | `CATALOG_LOCATION` | Location of the release catalog | `us-central1` |
//! | `BIND_ADDR` | HTTP bind address | `0.0.0.0:8080` |
//! | `PORT` | Overrides the bind port | |
//! | `ACCESS_TOKEN` | Static bearer token instead of the metadata server | |

use crate::error::{FleetError, Result};
use crate::networking::HttpServerConfig;
use crate::types::ProjectId;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default report object name
pub const DEFAULT_REPORT_OBJECT: &str = "report.html";

/// Default support window in months
pub const DEFAULT_SUPPORT_MONTHS: u32 = 12;

/// Default collection window in seconds
pub const DEFAULT_REGION_TIMEOUT_SECS: u64 = 5;

/// Default release catalog location
pub const DEFAULT_CATALOG_LOCATION: &str = "us-central1";

/// Where rendered reports go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// Cloud Storage bucket
    Bucket(String),
    /// Local directory
    Directory(PathBuf),
    /// Kept in memory only
    Memory,
}

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Projects to report on, in order
    pub projects: Vec<ProjectId>,
    /// Host project for run-wide catalogs
    pub host_project: ProjectId,
    /// Report destination
    pub sink: SinkTarget,
    /// Report object name
    pub report_object: String,
    /// Monitoring dashboard URL
    pub dashboard_url: String,
    /// Support window per release, in months
    pub support_months: u32,
    /// Collection window per project
    pub region_timeout: Duration,
    /// Release catalog location
    pub catalog_location: String,
    /// HTTP server config
    pub http_config: HttpServerConfig,
    /// Static bearer token
    pub access_token: Option<String>,
    /// Enable metrics
    pub metrics_enabled: bool,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            host_project: ProjectId::new(""),
            sink: SinkTarget::Memory,
            report_object: DEFAULT_REPORT_OBJECT.to_string(),
            dashboard_url: String::new(),
            support_months: DEFAULT_SUPPORT_MONTHS,
            region_timeout: Duration::from_secs(DEFAULT_REGION_TIMEOUT_SECS),
            catalog_location: DEFAULT_CATALOG_LOCATION.to_string(),
            http_config: HttpServerConfig::default(),
            access_token: None,
            metrics_enabled: true,
        }
    }
}

impl FleetConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let projects = get("PROJECTS").ok_or_else(|| missing("PROJECTS"))?;
        let host_project = get("PROJECT_ID").ok_or_else(|| missing("PROJECT_ID"))?;

        let mut config = Self {
            projects: parse_projects(&projects),
            host_project: ProjectId::new(host_project),
            sink: match (get("BUCKET"), get("REPORT_DIR")) {
                (Some(bucket), _) => SinkTarget::Bucket(bucket),
                (None, Some(dir)) => SinkTarget::Directory(PathBuf::from(dir)),
                (None, None) => SinkTarget::Memory,
            },
            access_token: get("ACCESS_TOKEN"),
            ..Self::default()
        };

        if let Some(object) = get("REPORT_OBJECT") {
            config.report_object = object;
        }
        if let Some(url) = get("MONITORING_DASHBOARD") {
            config.dashboard_url = url;
        }
        if let Some(months) = get("SUPPORT_MONTHS") {
            config.support_months = parse("SUPPORT_MONTHS", &months)?;
        }
        if let Some(secs) = get("REGION_TIMEOUT_SECS") {
            config.region_timeout = Duration::from_secs(parse("REGION_TIMEOUT_SECS", &secs)?);
        }
        if let Some(location) = get("CATALOG_LOCATION") {
            config.catalog_location = location;
        }
        if let Some(addr) = get("BIND_ADDR") {
            config.http_config = config.http_config.with_addr_str(&addr)?;
        }
        if let Some(port) = get("PORT") {
            config.http_config = config.http_config.with_port(parse("PORT", &port)?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.projects.is_empty() {
            return Err(FleetError::config("no projects configured"));
        }
        if self.host_project.as_str().is_empty() {
            return Err(FleetError::config("host project is not set"));
        }
        if self.region_timeout.is_zero() {
            return Err(FleetError::config("region timeout must be positive"));
        }
        if self.report_object.is_empty() {
            return Err(FleetError::config("report object name is empty"));
        }
        Ok(())
    }
}

/// Split a comma-separated list, dropping whitespace and empty entries
pub fn parse_projects(raw: &str) -> Vec<ProjectId> {
    raw.split(',')
        .map(|p| p.split_whitespace().collect::<String>())
        .filter(|p| !p.is_empty())
        .map(ProjectId::new)
        .collect()
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| FleetError::config(format!("invalid {}={:?}: {}", key, value, e)))
}

fn missing(key: &str) -> FleetError {
    FleetError::config(format!("missing required environment variable {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<FleetConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FleetConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("PROJECTS", "p1"), ("PROJECT_ID", "host")]).unwrap();

        assert_eq!(config.projects, vec![ProjectId::new("p1")]);
        assert_eq!(config.host_project.as_str(), "host");
        assert_eq!(config.sink, SinkTarget::Memory);
        assert_eq!(config.report_object, "report.html");
        assert_eq!(config.support_months, 12);
        assert_eq!(config.region_timeout, Duration::from_secs(5));
        assert_eq!(config.catalog_location, "us-central1");
        assert_eq!(config.http_config.bind_addr.port(), 8080);
        assert!(config.access_token.is_none());
    }

    #[test]
    fn test_full_environment() {
        let config = load(&[
            ("PROJECTS", " p1, p2 ,,p 3"),
            ("PROJECT_ID", "host"),
            ("BUCKET", "reports"),
            ("REPORT_DIR", "/tmp/ignored"),
            ("REPORT_OBJECT", "fleet.html"),
            ("MONITORING_DASHBOARD", "https://example.com/d"),
            ("SUPPORT_MONTHS", "18"),
            ("REGION_TIMEOUT_SECS", "10"),
            ("CATALOG_LOCATION", "europe-west1"),
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("PORT", "9100"),
            ("ACCESS_TOKEN", "ya29.token"),
        ])
        .unwrap();

        let projects: Vec<_> = config.projects.iter().map(|p| p.as_str()).collect();
        assert_eq!(projects, vec!["p1", "p2", "p3"]);
        assert_eq!(config.sink, SinkTarget::Bucket("reports".to_string()));
        assert_eq!(config.report_object, "fleet.html");
        assert_eq!(config.dashboard_url, "https://example.com/d");
        assert_eq!(config.support_months, 18);
        assert_eq!(config.region_timeout, Duration::from_secs(10));
        assert_eq!(config.catalog_location, "europe-west1");
        assert_eq!(config.http_config.bind_addr.to_string(), "127.0.0.1:9100");
        assert_eq!(config.access_token.as_deref(), Some("ya29.token"));
    }

    #[test]
    fn test_report_dir_sink() {
        let config = load(&[
            ("PROJECTS", "p1"),
            ("PROJECT_ID", "host"),
            ("BUCKET", ""),
            ("REPORT_DIR", "/var/reports"),
        ])
        .unwrap();
        assert_eq!(config.sink, SinkTarget::Directory(PathBuf::from("/var/reports")));
    }

    #[test]
    fn test_missing_and_invalid() {
        let err = load(&[("PROJECT_ID", "host")]).unwrap_err();
        assert!(err.to_string().contains("PROJECTS"));

        let err = load(&[("PROJECTS", " , "), ("PROJECT_ID", "host")]).unwrap_err();
        assert!(matches!(err, FleetError::Config(_)));

        let err = load(&[("PROJECTS", "p1")]).unwrap_err();
        assert!(err.to_string().contains("PROJECT_ID"));

        let required = [("PROJECTS", "p1"), ("PROJECT_ID", "host")];
        let with = |key, value| {
            let mut vars = required.to_vec();
            vars.push((key, value));
            load(&vars).unwrap_err()
        };

        let err = with("SUPPORT_MONTHS", "-1");
        assert!(err.to_string().contains("SUPPORT_MONTHS"));

        let err = with("REGION_TIMEOUT_SECS", "0");
        assert!(matches!(err, FleetError::Config(_)));

        let err = with("BIND_ADDR", "nowhere");
        assert!(matches!(err, FleetError::Config(_)));
    }
}
