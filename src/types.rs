//! Core types for fleet reports
//!
//! ## Table of Contents
//! - **ProjectId** / **Region**: Opaque identifiers
//! - **EnvironmentKey**: Composite (project, region, name) join key
//! - **EnvironmentRecord**: One row of the fleet report
//! - **HealthRatio** / **RunSuccessRatio**: Tagged metric values
//! - **VersionSupport**: Remaining support per platform version
//! - **MetricRatioTable**: Per-environment percentages
//! - **FailureSet**: Projects that could not be fully read

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Identifier of a billing/ownership scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    /// Create a new project id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the project id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Geographic deployment zone, e.g. `us-central1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Region(String);

impl Region {
    /// Create a new region
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get region name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Region {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Region {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Regions proven unusable while processing one project
pub type RegionExclusionSet = BTreeSet<Region>;

/// Composite identity joining inventory and metric data
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvironmentKey {
    /// Owning project
    pub project: ProjectId,
    /// Region the environment lives in
    pub region: Region,
    /// Environment name, unique within (project, region)
    pub name: String,
}

impl EnvironmentKey {
    /// Create a new key
    pub fn new(
        project: impl Into<ProjectId>,
        region: impl Into<Region>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            region: region.into(),
            name: name.into(),
        }
    }

    /// Parse a fully-qualified `projects/{p}/locations/{r}/environments/{name}` resource name
    pub fn from_resource_name(resource: &str) -> Option<Self> {
        let rest = resource.strip_prefix("projects/")?;
        let (project, rest) = rest.split_once("/locations/")?;
        let (region, name) = rest.split_once("/environments/")?;
        if project.is_empty() || region.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(project, region, name))
    }

    /// Console page for this environment
    pub fn console_url(&self) -> String {
        format!(
            "https://console.cloud.google.com/composer/environments/detail/{}/{}?project={}",
            self.region, self.name, self.project
        )
    }
}

impl fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.project, self.region, self.name)
    }
}

/// Lifecycle state reported by the environment inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvironmentState {
    /// Being created
    Creating,
    /// Serving
    Running,
    /// Being updated
    Updating,
    /// Being deleted
    Deleting,
    /// Failed
    Error,
    /// Any state this crate does not know about
    Other(String),
}

impl EnvironmentState {
    /// Upstream spelling of the state
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "CREATING",
            Self::Running => "RUNNING",
            Self::Updating => "UPDATING",
            Self::Deleting => "DELETING",
            Self::Error => "ERROR",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for EnvironmentState {
    fn from(s: &str) -> Self {
        match s.trim_start_matches("State.") {
            "CREATING" => Self::Creating,
            "RUNNING" => Self::Running,
            "UPDATING" => Self::Updating,
            "DELETING" => Self::Deleting,
            "ERROR" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EnvironmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Share of the trailing window an environment reported healthy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthRatio {
    /// Percentage 0-100
    Reported(u8),
    /// The environment never reported health in the window
    Unknown,
}

impl HealthRatio {
    /// Percentage if reported
    pub fn percent(&self) -> Option<u8> {
        match self {
            Self::Reported(p) => Some(*p),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for HealthRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reported(p) => write!(f, "{}", p),
            Self::Unknown => f.write_str("0"),
        }
    }
}

/// Share of workflow runs that succeeded in the trailing window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunSuccessRatio {
    /// Percentage 0-100
    Reported(u8),
    /// No runs recorded in the window
    NoRuns,
}

impl RunSuccessRatio {
    /// Percentage if reported
    pub fn percent(&self) -> Option<u8> {
        match self {
            Self::Reported(p) => Some(*p),
            Self::NoRuns => None,
        }
    }
}

impl fmt::Display for RunSuccessRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reported(p) => write!(f, "{}", p),
            Self::NoRuns => Ok(()),
        }
    }
}

/// Platform and sub-component version parsed from an image version id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageVersion {
    /// Platform (Composer) version, e.g. `2.9.7`
    pub platform: String,
    /// Sub-component (Airflow) version, e.g. `2.9.3`
    pub component: String,
}

impl ImageVersion {
    /// Parse `composer-{platform}-airflow-{component}`
    pub fn parse(id: &str) -> Option<Self> {
        let rest = id.strip_prefix("composer-")?;
        let (platform, component) = rest.split_once("-airflow-")?;
        if platform.is_empty() || component.is_empty() {
            return None;
        }
        Some(Self {
            platform: platform.to_string(),
            component: component.to_string(),
        })
    }
}

/// One row of the fleet report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    /// Composite identity
    pub key: EnvironmentKey,
    /// Console page
    pub url: String,
    /// Lifecycle state
    pub state: EnvironmentState,
    /// Platform and component versions, if the image version was recognised
    pub version: Option<ImageVersion>,
    /// Private IP environment
    pub private: bool,
    /// Whole days since creation
    pub created_days: Option<i64>,
    /// Whole days since last update
    pub updated_days: Option<i64>,
    /// Months of support left for the platform version
    pub support_months: Option<u32>,
    /// Health over the trailing window
    pub health: HealthRatio,
    /// Run success over the trailing window
    pub run_success: RunSuccessRatio,
}

impl EnvironmentRecord {
    /// Create a record with only identity and state populated
    pub fn new(key: EnvironmentKey, state: EnvironmentState) -> Self {
        let url = key.console_url();
        Self {
            key,
            url,
            state,
            version: None,
            private: false,
            created_days: None,
            updated_days: None,
            support_months: None,
            health: HealthRatio::Unknown,
            run_success: RunSuccessRatio::NoRuns,
        }
    }

    /// Fill in both metric values from the owning project's tables
    pub fn enrich(&mut self, health: &MetricRatioTable, runs: &MetricRatioTable) {
        self.health = match health.get(&self.key) {
            Some(p) => HealthRatio::Reported(p),
            None => HealthRatio::Unknown,
        };
        self.run_success = match runs.get(&self.key) {
            Some(p) => RunSuccessRatio::Reported(p),
            None => RunSuccessRatio::NoRuns,
        };
    }
}

/// Remaining support months per platform version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSupport(HashMap<String, u32>);

impl VersionSupport {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record months left for a version, replacing any earlier value
    pub fn insert(&mut self, version: impl Into<String>, months: u32) {
        self.0.insert(version.into(), months);
    }

    /// Months left for a version
    pub fn months_left(&self, version: &str) -> Option<u32> {
        self.0.get(version).copied()
    }

    /// Number of known versions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no version is known
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Integer percentage per environment, for one metric stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricRatioTable(HashMap<EnvironmentKey, u8>);

impl MetricRatioTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Divide numerators by denominators key by key.
    ///
    /// Keys with a zero denominator are left out. Keys missing from
    /// `numerators` count as zero.
    pub fn from_counts(
        numerators: &HashMap<EnvironmentKey, i64>,
        denominators: &HashMap<EnvironmentKey, i64>,
    ) -> Self {
        let table = denominators
            .iter()
            .filter_map(|(key, &total)| {
                let hits = numerators.get(key).copied().unwrap_or(0);
                percent(hits, total).map(|p| (key.clone(), p))
            })
            .collect();
        Self(table)
    }

    /// Insert a percentage directly
    pub fn insert(&mut self, key: EnvironmentKey, percent: u8) {
        self.0.insert(key, percent);
    }

    /// Look up an environment
    pub fn get(&self, key: &EnvironmentKey) -> Option<u8> {
        self.0.get(key).copied()
    }

    /// Whether the table has an entry for the key
    pub fn contains(&self, key: &EnvironmentKey) -> bool {
        self.0.contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `100 * hits / total` rounded half to even, `None` when `total` is not positive
pub fn percent(hits: i64, total: i64) -> Option<u8> {
    if total <= 0 {
        return None;
    }
    let hits = hits.clamp(0, total) as i128;
    let total = total as i128;
    let scaled = 100 * hits;
    let mut q = scaled / total;
    let twice_rem = 2 * (scaled % total);
    if twice_rem > total || (twice_rem == total && q % 2 == 1) {
        q += 1;
    }
    Some(q as u8)
}

/// A project that could not be fully read, with the reasons why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFailure {
    /// Project
    pub project: ProjectId,
    /// Human-readable reasons, deduplicated, in discovery order
    pub reasons: Vec<String>,
}

/// Insertion-ordered set of failed projects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSet {
    entries: Vec<ProjectFailure>,
}

impl FailureSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for a project. Returns true if the project was not yet in the set.
    pub fn record(&mut self, project: &ProjectId, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.project == project) {
            if !entry.reasons.contains(&reason) {
                entry.reasons.push(reason);
            }
            return false;
        }
        self.entries.push(ProjectFailure {
            project: project.clone(),
            reasons: vec![reason],
        });
        true
    }

    /// Whether a project failed
    pub fn contains(&self, project: &ProjectId) -> bool {
        self.entries.iter().any(|e| &e.project == project)
    }

    /// Failed projects in the order they were first recorded
    pub fn projects(&self) -> impl Iterator<Item = &ProjectId> {
        self.entries.iter().map(|e| &e.project)
    }

    /// All entries
    pub fn iter(&self) -> impl Iterator<Item = &ProjectFailure> {
        self.entries.iter()
    }

    /// Number of failed projects
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no project failed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_name_parsing() {
        let key = EnvironmentKey::from_resource_name(
            "projects/acme-prod/locations/europe-west1/environments/etl",
        )
        .unwrap();
        assert_eq!(key.project.as_str(), "acme-prod");
        assert_eq!(key.region.name(), "europe-west1");
        assert_eq!(key.name, "etl");
        assert_eq!(
            key.console_url(),
            "https://console.cloud.google.com/composer/environments/detail/europe-west1/etl?project=acme-prod"
        );

        assert!(EnvironmentKey::from_resource_name("projects/p/environments/x").is_none());
        assert!(
            EnvironmentKey::from_resource_name("projects//locations/r/environments/x").is_none()
        );
    }

    #[test]
    fn test_keys_with_same_name_are_distinct() {
        let a = EnvironmentKey::new("p1", "us-east1", "etl");
        let b = EnvironmentKey::new("p2", "us-east1", "etl");
        let c = EnvironmentKey::new("p1", "us-west1", "etl");
        assert_ne!(a, b);
        assert_ne!(a, c);

        let mut table = MetricRatioTable::new();
        table.insert(a.clone(), 90);
        assert_eq!(table.get(&a), Some(90));
        assert_eq!(table.get(&b), None);
        assert_eq!(table.get(&c), None);
    }

    #[test]
    fn test_image_version_parsing() {
        let v = ImageVersion::parse("composer-2.9.7-airflow-2.9.3").unwrap();
        assert_eq!(v.platform, "2.9.7");
        assert_eq!(v.component, "2.9.3");

        let v = ImageVersion::parse("composer-1.20.12-airflow-1.10.15").unwrap();
        assert_eq!(v.platform, "1.20.12");
        assert_eq!(v.component, "1.10.15");

        assert!(ImageVersion::parse("airflow-2.9.3").is_none());
        assert!(ImageVersion::parse("composer-2.9.7").is_none());
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent(1, 2), Some(50));
        assert_eq!(percent(2, 3), Some(67));
        assert_eq!(percent(1, 3), Some(33));
        // 12.5 and 87.5 round to the even neighbour
        assert_eq!(percent(1, 8), Some(12));
        assert_eq!(percent(7, 8), Some(88));
        assert_eq!(percent(0, 5), Some(0));
        assert_eq!(percent(5, 5), Some(100));
        assert_eq!(percent(3, 0), None);
    }

    #[test]
    fn test_zero_denominator_is_omitted() {
        let ok = EnvironmentKey::new("p1", "r1", "a");
        let empty = EnvironmentKey::new("p1", "r1", "b");
        let no_hits = EnvironmentKey::new("p1", "r1", "c");

        let numerators = HashMap::from([(ok.clone(), 3), (empty.clone(), 0)]);
        let denominators =
            HashMap::from([(ok.clone(), 4), (empty.clone(), 0), (no_hits.clone(), 10)]);

        let table = MetricRatioTable::from_counts(&numerators, &denominators);
        assert_eq!(table.get(&ok), Some(75));
        assert!(!table.contains(&empty));
        assert_eq!(table.get(&no_hits), Some(0));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_enrich_defaults() {
        let key = EnvironmentKey::new("p1", "r1", "etl");
        let mut record = EnvironmentRecord::new(key.clone(), EnvironmentState::Running);
        record.enrich(&MetricRatioTable::new(), &MetricRatioTable::new());

        assert_eq!(record.health, HealthRatio::Unknown);
        assert_eq!(record.run_success, RunSuccessRatio::NoRuns);
        assert_eq!(record.health.to_string(), "0");
        assert_eq!(record.run_success.to_string(), "");

        let mut health = MetricRatioTable::new();
        health.insert(key.clone(), 98);
        let mut runs = MetricRatioTable::new();
        runs.insert(key, 0);
        record.enrich(&health, &runs);
        assert_eq!(record.health.to_string(), "98");
        assert_eq!(record.run_success.to_string(), "0");
    }

    #[test]
    fn test_failure_set_dedup() {
        let p1 = ProjectId::new("p1");
        let p2 = ProjectId::new("p2");
        let mut failures = FailureSet::new();

        assert!(failures.record(&p1, "metrics"));
        assert!(!failures.record(&p1, "metrics"));
        assert!(!failures.record(&p1, "403 in us-east1"));
        assert!(failures.record(&p2, "metrics"));

        assert_eq!(failures.len(), 2);
        let projects: Vec<_> = failures.projects().map(|p| p.as_str()).collect();
        assert_eq!(projects, vec!["p1", "p2"]);
        assert_eq!(failures.iter().next().unwrap().reasons.len(), 2);
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(EnvironmentState::from("RUNNING"), EnvironmentState::Running);
        assert_eq!(EnvironmentState::from("State.ERROR"), EnvironmentState::Error);
        assert_eq!(
            EnvironmentState::from("STATE_UNSPECIFIED").as_str(),
            "STATE_UNSPECIFIED"
        );
    }
}
