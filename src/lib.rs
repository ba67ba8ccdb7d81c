//! # fleetmon
//!
//! Point-in-time health reports for a fleet of Cloud Composer environments
//! spread across many projects and regions.
//!
//! ## Features
//!
//! - **Discovery**: Lists every environment in every candidate region, concurrently per project
//! - **Enrichment**: Version support left, 24h health and DAG run success per environment
//! - **Partial failure**: Unreadable projects are reported with a remediation hint
//! - **Report**: One HTML document stored in Cloud Storage, a local directory or memory
//! - **Metrics**: Prometheus-compatible metrics export
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleetmon::FleetBuilder;
//!
//! #[tokio::main]
//! async fn main() -> fleetmon::Result<()> {
//!     let service = FleetBuilder::new()
//!         .with_projects(["team-a-prod", "team-b-prod"])
//!         .with_host_project("fleet-admin")
//!         .with_bucket("fleet-reports")
//!         .build()?;
//!
//!     let outcome = service.run_report().await?;
//!     println!("{}", outcome);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod builder;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod enumerator;
pub mod error;
pub mod metrics;
pub mod networking;
pub mod provider;
pub mod ratios;
pub mod report;
pub mod service;
pub mod storage;
pub mod types;

// Re-exports for ergonomic API
pub use builder::FleetBuilder;
pub use config::{FleetConfig, SinkTarget};
pub use engine::{EngineConfig, FleetEngine, FleetSnapshot, RegionOutcome};
pub use error::{FleetError, ProviderError, Result};
pub use metrics::FleetMetrics;
pub use networking::{HttpServer, HttpServerConfig};
pub use provider::{GcpClient, Providers, TokenSource};
pub use report::ReportRenderer;
pub use service::{FleetService, ReportOutcome};
pub use storage::{FileStore, GcsStore, MemoryStore, ReportSink};
pub use types::{
    EnvironmentKey, EnvironmentRecord, FailureSet, HealthRatio, ProjectId, Region, RunSuccessRatio,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::FleetBuilder;
    pub use crate::error::Result;
    pub use crate::provider::Providers;
    pub use crate::service::FleetService;
    pub use crate::types::{EnvironmentRecord, ProjectId};
}
