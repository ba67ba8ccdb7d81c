//! fleetmon service entry point
//!
//! Reads configuration from the environment and serves the HTTP trigger.
//! `fleetmon once` runs a single report cycle and exits.

use anyhow::Context;
use fleetmon::{FleetBuilder, FleetConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = FleetConfig::from_env().context("loading configuration")?;
    let service = FleetBuilder::from_config(config)
        .build()
        .context("building report service")?;

    if std::env::args().nth(1).as_deref() == Some("once") {
        let outcome = service.run_report().await.context("report run failed")?;
        tracing::info!(outcome = %outcome, "Single run finished");
        return Ok(());
    }

    Arc::new(service).run().await?;
    Ok(())
}
