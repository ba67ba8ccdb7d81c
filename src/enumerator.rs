//! Environment enumeration for one (project, region)
//!
//! ## Table of Contents
//! - **RegionListing**: What a region call produced
//! - **list_environments**: Lists and normalises environments
//! - **normalize**: Converts one inventory entry into a partial record

use crate::error::{FleetError, ProviderError, Result};
use crate::provider::{EnvironmentInventory, RawEnvironment};
use crate::types::{
    EnvironmentKey, EnvironmentRecord, EnvironmentState, ImageVersion, ProjectId, Region,
    VersionSupport,
};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Outcome of listing one region
#[derive(Debug, Clone, PartialEq)]
pub enum RegionListing {
    /// Environments found, metric fields not yet filled in
    Environments(Vec<EnvironmentRecord>),
    /// The execution identity may not read this project
    AccessDenied {
        /// Project that refused access
        project: ProjectId,
        /// Region that was being listed
        region: Region,
        /// What to do about it
        remediation: String,
    },
    /// The region is not offered for this project and should not be scanned again
    RegionUnavailable {
        /// Region to exclude
        region: Region,
        /// Upstream message
        reason: String,
    },
}

/// List environments in a region and normalise each entry.
///
/// Authorization failures and invalid locations are returned as listings;
/// any other failure is an error for this call only.
pub async fn list_environments(
    inventory: &dyn EnvironmentInventory,
    project: &ProjectId,
    region: &Region,
    versions: &VersionSupport,
    now: DateTime<Utc>,
) -> Result<RegionListing> {
    let raw = match inventory.list_environments(project, region).await {
        Ok(raw) => raw,
        Err(ProviderError::PermissionDenied(msg)) => {
            warn!(
                project = %project,
                region = %region,
                error = %msg,
                "Permission denied listing environments"
            );
            return Ok(RegionListing::AccessDenied {
                project: project.clone(),
                region: region.clone(),
                remediation: access_remediation(project),
            });
        }
        Err(ProviderError::LocationUnavailable(msg)) => {
            debug!(project = %project, region = %region, error = %msg, "Region not available");
            return Ok(RegionListing::RegionUnavailable {
                region: region.clone(),
                reason: msg,
            });
        }
        Err(ProviderError::Other(msg)) => {
            return Err(FleetError::inventory(format!(
                "listing environments in {}/{} failed: {}",
                project, region, msg
            )));
        }
    };

    let records: Vec<EnvironmentRecord> = raw
        .iter()
        .filter_map(|env| normalize(env, versions, now))
        .collect();

    debug!(project = %project, region = %region, environments = records.len(), "Region listed");
    Ok(RegionListing::Environments(records))
}

/// Remediation hint for an authorization failure
pub fn access_remediation(project: &ProjectId) -> String {
    format!(
        "Permission denied (403) when accessing the Composer API in project {}. \
         Grant the Composer User role in this project to the service account running the report.",
        project
    )
}

/// Convert one inventory entry into a record.
///
/// Returns `None` when the resource name does not carry a full identity.
pub fn normalize(
    env: &RawEnvironment,
    versions: &VersionSupport,
    now: DateTime<Utc>,
) -> Option<EnvironmentRecord> {
    let Some(key) = EnvironmentKey::from_resource_name(&env.name) else {
        warn!(name = %env.name, "Skipping environment with unparseable resource name");
        return None;
    };

    let mut record = EnvironmentRecord::new(key, EnvironmentState::from(env.state.as_str()));
    record.version = env.image_version.as_deref().and_then(ImageVersion::parse);
    record.support_months = record
        .version
        .as_ref()
        .and_then(|v| versions.months_left(&v.platform));
    record.private = env.private.unwrap_or(false);
    record.created_days = env.create_time.map(|t| days_between(t, now));
    record.updated_days = env.update_time.map(|t| days_between(t, now));
    Some(record)
}

/// Whole calendar days from `then` to `now`, both taken as UTC dates
fn days_between(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now.date_naive() - then.date_naive()).num_days()
}
