//! Run-wide catalogs resolved once before any fan-out
//!
//! ## Table of Contents
//! - **list_regions**: Candidate regions from the region inventory
//! - **list_version_support**: Remaining support months per platform version
//! - **months_left**: Support arithmetic for a single release

use crate::error::{FleetError, Result};
use crate::provider::{RegionInventory, ReleaseCatalog, ReleaseDate};
use crate::types::{ImageVersion, ProjectId, Region, VersionSupport};
use chrono::NaiveDate;
use tracing::{debug, info};

/// Releases dated before this year are treated as malformed
const FIRST_RELEASE_YEAR: i32 = 2017;

/// Candidate regions for a project.
///
/// Any failure is fatal for the run: without regions there is nothing to scan.
pub async fn list_regions(
    inventory: &dyn RegionInventory,
    project: &ProjectId,
) -> Result<Vec<Region>> {
    let names = inventory.list_regions(project).await.map_err(|e| {
        FleetError::access_denied(format!(
            "No access to Compute Engine API in project {}. Check that the Compute Engine API \
             is enabled and that the service account has the Compute Viewer role ({})",
            project, e
        ))
    })?;

    info!(project = %project, regions = names.len(), "Region catalog resolved");
    Ok(names.into_iter().map(Region::from).collect())
}

/// Remaining support months for every known platform version.
///
/// Releases without a sane date or with an unrecognised version id are skipped.
pub async fn list_version_support(
    catalog: &dyn ReleaseCatalog,
    project: &ProjectId,
    location: &str,
    support_window_months: u32,
    today: NaiveDate,
) -> Result<VersionSupport> {
    let releases = catalog.list_releases(project, location).await.map_err(|e| {
        FleetError::access_denied(format!(
            "No access to Composer API in project {}. Check that the Composer API is enabled \
             and that the service account has the Composer User role ({})",
            project, e
        ))
    })?;

    let mut support = VersionSupport::new();
    for release in &releases {
        let Some(version) = ImageVersion::parse(&release.image_version_id) else {
            debug!(id = %release.image_version_id, "Skipping unrecognised image version");
            continue;
        };
        let Some(released) = release.release_date.and_then(release_day) else {
            debug!(id = %release.image_version_id, "Skipping release without a valid date");
            continue;
        };
        support.insert(version.platform, months_left(support_window_months, released, today));
    }

    info!(
        releases = releases.len(),
        versions = support.len(),
        window = support_window_months,
        "Version catalog resolved"
    );
    Ok(support)
}

fn release_day(date: ReleaseDate) -> Option<NaiveDate> {
    if date.year < FIRST_RELEASE_YEAR {
        return None;
    }
    NaiveDate::from_ymd_opt(date.year, date.month, date.day)
}

/// `max(0, floor(window - days_since_release / 30))`.
///
/// A release dated in the future has a negative age and so more than the
/// window left.
pub fn months_left(support_window_months: u32, released: NaiveDate, today: NaiveDate) -> u32 {
    let days = (today - released).num_days();
    let left = support_window_months as f64 - days as f64 / 30.0;
    left.max(0.0).floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{MockRegionInventory, MockReleaseCatalog, Release};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn release(id: &str, date: Option<(i32, u32, u32)>) -> Release {
        Release {
            image_version_id: id.to_string(),
            release_date: date.map(|(year, month, day)| ReleaseDate { year, month, day }),
        }
    }

    #[test]
    fn test_months_left() {
        let today = day(2024, 12, 31);
        assert_eq!(months_left(12, today, today), 12);
        // 45 days -> 12 - 1.5 = 10.5 -> 10
        assert_eq!(months_left(12, day(2024, 11, 16), today), 10);
        // long expired clamps to zero
        assert_eq!(months_left(12, day(2020, 1, 1), today), 0);
        // 152 days ahead -> 12 + 5.07 -> 17
        assert_eq!(months_left(12, day(2025, 6, 1), today), 17);
        assert_eq!(months_left(0, day(2025, 6, 1), today), 5);
    }

    #[tokio::test]
    async fn test_list_regions() {
        let mut inventory = MockRegionInventory::new();
        inventory
            .expect_list_regions()
            .returning(|_| Ok(vec!["us-central1".to_string(), "europe-west1".to_string()]));

        let regions = list_regions(&inventory, &ProjectId::new("host")).await.unwrap();
        assert_eq!(regions, vec![Region::new("us-central1"), Region::new("europe-west1")]);
    }

    #[tokio::test]
    async fn test_list_regions_failure_is_fatal() {
        let mut inventory = MockRegionInventory::new();
        inventory
            .expect_list_regions()
            .returning(|_| Err(ProviderError::PermissionDenied("HTTP 403".into())));

        let err = list_regions(&inventory, &ProjectId::new("host")).await.unwrap_err();
        assert!(matches!(err, FleetError::AccessDenied(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_version_support_skips_malformed() {
        let mut catalog = MockReleaseCatalog::new();
        catalog
            .expect_list_releases()
            .withf(|_, location| location.to_string() == "us-central1")
            .returning(|_, _| {
                Ok(vec![
                    release("composer-2.9.7-airflow-2.9.3", Some((2024, 12, 1))),
                    release("composer-2.9.7-airflow-2.8.1", Some((2024, 12, 16))),
                    release("composer-1.20.12-airflow-1.10.15", Some((2023, 1, 1))),
                    release("composer-2.0.0-airflow-2.1.4", Some((2016, 5, 1))),
                    release("composer-2.1.0-airflow-2.2.5", Some((2024, 2, 30))),
                    release("composer-2.2.0-airflow-2.3.4", None),
                    release("composer-latest-airflow", Some((2024, 12, 1))),
                ])
            });

        let support = list_version_support(
            &catalog,
            &ProjectId::new("host"),
            "us-central1",
            12,
            day(2024, 12, 31),
        )
        .await
        .unwrap();

        // later entry for the same platform version wins: 15 days -> 11.5 -> 11
        assert_eq!(support.months_left("2.9.7"), Some(11));
        assert_eq!(support.months_left("1.20.12"), Some(0));
        assert_eq!(support.months_left("2.0.0"), None);
        assert_eq!(support.months_left("2.1.0"), None);
        assert_eq!(support.months_left("2.2.0"), None);
        assert_eq!(support.len(), 2);
    }

    #[tokio::test]
    async fn test_version_support_failure_is_fatal() {
        let mut catalog = MockReleaseCatalog::new();
        catalog
            .expect_list_releases()
            .returning(|_, _| Err(ProviderError::Other("HTTP 500".into())));

        let err = list_version_support(
            &catalog,
            &ProjectId::new("host"),
            "us-central1",
            12,
            day(2024, 12, 31),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FleetError::AccessDenied(_)));
    }
}
