//! Google Cloud REST client
//!
//! ## Table of Contents
//! - **GcpClient**: HTTP client for Compute, Composer, Monitoring and Storage
//! - **TokenSource**: Where bearer tokens come from
//! - **GcpEndpoints**: API base URLs (overridable for emulators)

use super::{
    EnvironmentInventory, MetricQuery, ProviderResult, RawEnvironment, Release, ReleaseCatalog,
    ReleaseDate, RegionInventory, TimeSeries, TimeSeriesSource,
};
use crate::error::{FleetError, ProviderError, Result};
use crate::types::{ProjectId, Region};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before the metadata server says they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Where bearer tokens come from
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Send no Authorization header (emulators, tests)
    Anonymous,
    /// A fixed token
    Static(String),
    /// The runtime's metadata server, i.e. the execution identity
    MetadataServer,
}

/// API base URLs
#[derive(Debug, Clone)]
pub struct GcpEndpoints {
    /// Compute Engine v1
    pub compute: String,
    /// Composer v1
    pub composer: String,
    /// Cloud Monitoring v3
    pub monitoring: String,
    /// Cloud Storage upload API
    pub storage_upload: String,
}

impl Default for GcpEndpoints {
    fn default() -> Self {
        Self {
            compute: "https://compute.googleapis.com/compute/v1".to_string(),
            composer: "https://composer.googleapis.com/v1".to_string(),
            monitoring: "https://monitoring.googleapis.com/v3".to_string(),
            storage_upload: "https://storage.googleapis.com/upload/storage/v1".to_string(),
        }
    }
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Google Cloud API client
#[derive(Clone)]
pub struct GcpClient {
    client: Client,
    endpoints: GcpEndpoints,
    tokens: TokenSource,
    cached: Arc<Mutex<Option<CachedToken>>>,
    page_size: u32,
}

impl GcpClient {
    /// Create a new client
    pub fn new(tokens: TokenSource) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FleetError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoints: GcpEndpoints::default(),
            tokens,
            cached: Arc::new(Mutex::new(None)),
            page_size: 100,
        })
    }

    /// Override API base URLs
    pub fn with_endpoints(mut self, endpoints: GcpEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Set the page size used for list calls
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn bearer(&self) -> ProviderResult<Option<String>> {
        match &self.tokens {
            TokenSource::Anonymous => Ok(None),
            TokenSource::Static(token) => Ok(Some(token.clone())),
            TokenSource::MetadataServer => {
                let fresh = self
                    .cached
                    .lock()
                    .as_ref()
                    .filter(|c| Instant::now() < c.refresh_at)
                    .map(|c| c.token.clone());
                if fresh.is_some() {
                    return Ok(fresh);
                }

                let resp = self
                    .client
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(ProviderError::from_status(status.as_u16(), body));
                }
                let token: MetadataToken = resp
                    .json()
                    .await
                    .map_err(|e| ProviderError::Other(e.to_string()))?;

                let lifetime =
                    Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
                *self.cached.lock() = Some(CachedToken {
                    token: token.access_token.clone(),
                    refresh_at: Instant::now() + lifetime,
                });
                debug!(expires_in = token.expires_in, "Fetched access token from metadata server");
                Ok(Some(token.access_token))
            }
        }
    }

    async fn add_auth(&self, req: RequestBuilder) -> ProviderResult<RequestBuilder> {
        Ok(match self.bearer().await? {
            Some(token) => req.bearer_auth(token),
            None => req,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> ProviderResult<T> {
        let resp = self
            .add_auth(self.client.get(url).query(query))
            .await?
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        resp.json()
            .await
            .map_err(|e| ProviderError::Other(format!("Malformed response from {}: {}", url, e)))
    }

    /// Fetch every page of a list call
    async fn get_paged<P: Page>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> ProviderResult<Vec<P::Item>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = query.to_vec();
            if let Some(token) = page_token.take() {
                params.push(("pageToken", token));
            }

            let page: P = self.get_json(url, &params).await?;
            let (batch, next) = page.into_parts();
            items.extend(batch);

            match next.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(items)
    }

    /// Upload an object to Cloud Storage
    pub async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        content_type: &str,
        body: String,
    ) -> ProviderResult<()> {
        let url = format!("{}/b/{}/o", self.endpoints.storage_upload, bucket);
        let resp = self
            .add_auth(
                self.client
                    .post(&url)
                    .query(&[("uploadType", "media"), ("name", name)])
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .body(body),
            )
            .await?
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        info!(bucket = %bucket, object = %name, "Object uploaded");
        Ok(())
    }
}

#[async_trait]
impl RegionInventory for GcpClient {
    async fn list_regions(&self, project: &ProjectId) -> ProviderResult<Vec<String>> {
        let url = format!("{}/projects/{}/regions", self.endpoints.compute, project);
        let items = self
            .get_paged::<RegionList>(&url, &[("maxResults", self.page_size.to_string())])
            .await?;
        Ok(items.into_iter().map(|r| r.name).collect())
    }
}

#[async_trait]
impl ReleaseCatalog for GcpClient {
    async fn list_releases(
        &self,
        project: &ProjectId,
        location: &str,
    ) -> ProviderResult<Vec<Release>> {
        let url = format!(
            "{}/projects/{}/locations/{}/imageVersions",
            self.endpoints.composer, project, location
        );
        let items = self
            .get_paged::<ImageVersionList>(
                &url,
                &[
                    ("pageSize", self.page_size.to_string()),
                    ("includePastReleases", "true".to_string()),
                ],
            )
            .await?;

        Ok(items
            .into_iter()
            .map(|v| Release {
                image_version_id: v.image_version_id,
                release_date: v.release_date.map(|d| ReleaseDate {
                    year: d.year,
                    month: d.month,
                    day: d.day,
                }),
            })
            .collect())
    }
}

#[async_trait]
impl EnvironmentInventory for GcpClient {
    async fn list_environments(
        &self,
        project: &ProjectId,
        region: &Region,
    ) -> ProviderResult<Vec<RawEnvironment>> {
        let url = format!(
            "{}/projects/{}/locations/{}/environments",
            self.endpoints.composer, project, region
        );
        let items = self
            .get_paged::<EnvironmentList>(&url, &[("pageSize", self.page_size.to_string())])
            .await?;

        Ok(items.into_iter().map(RawEnvironment::from).collect())
    }
}

#[async_trait]
impl TimeSeriesSource for GcpClient {
    async fn query(
        &self,
        project: &ProjectId,
        query: &MetricQuery,
    ) -> ProviderResult<Vec<TimeSeries>> {
        let url = format!("{}/projects/{}/timeSeries", self.endpoints.monitoring, project);
        let end = Utc::now();
        let window = chrono::Duration::from_std(query.window)
            .map_err(|e| ProviderError::Other(format!("Invalid window: {}", e)))?;
        let start = end - window;

        let params = [
            ("filter", query.filter()),
            ("interval.startTime", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("interval.endTime", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("aggregation.alignmentPeriod", format!("{}s", query.window.as_secs())),
            ("aggregation.perSeriesAligner", query.aligner.as_str().to_string()),
            ("view", "FULL".to_string()),
            ("pageSize", self.page_size.to_string()),
        ];

        let series = self.get_paged::<TimeSeriesList>(&url, &params).await?;
        debug!(
            project = %project,
            metric = %query.metric_type,
            aligner = query.aligner.as_str(),
            series = series.len(),
            "Time series fetched"
        );

        Ok(series.into_iter().filter_map(WireSeries::into_series).collect())
    }
}

// Wire types

trait Page: DeserializeOwned {
    type Item;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionList {
    #[serde(default)]
    items: Vec<RegionItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegionItem {
    name: String,
}

impl Page for RegionList {
    type Item = RegionItem;
    fn into_parts(self) -> (Vec<RegionItem>, Option<String>) {
        (self.items, self.next_page_token)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageVersionList {
    #[serde(default)]
    image_versions: Vec<ImageVersionItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageVersionItem {
    image_version_id: String,
    release_date: Option<WireDate>,
}

#[derive(Debug, Deserialize)]
struct WireDate {
    #[serde(default)]
    year: i32,
    #[serde(default)]
    month: u32,
    #[serde(default)]
    day: u32,
}

impl Page for ImageVersionList {
    type Item = ImageVersionItem;
    fn into_parts(self) -> (Vec<ImageVersionItem>, Option<String>) {
        (self.image_versions, self.next_page_token)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentList {
    #[serde(default)]
    environments: Vec<EnvironmentItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentItem {
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    config: EnvironmentConfig,
    create_time: Option<DateTime<Utc>>,
    update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentConfig {
    #[serde(default)]
    software_config: SoftwareConfig,
    private_environment_config: Option<PrivateEnvironmentConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SoftwareConfig {
    image_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrivateEnvironmentConfig {
    enable_private_environment: Option<bool>,
}

impl From<EnvironmentItem> for RawEnvironment {
    fn from(item: EnvironmentItem) -> Self {
        Self {
            name: item.name,
            state: item.state,
            image_version: item.config.software_config.image_version,
            private: item
                .config
                .private_environment_config
                .and_then(|p| p.enable_private_environment),
            create_time: item.create_time,
            update_time: item.update_time,
        }
    }
}

impl Page for EnvironmentList {
    type Item = EnvironmentItem;
    fn into_parts(self) -> (Vec<EnvironmentItem>, Option<String>) {
        (self.environments, self.next_page_token)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeSeriesList {
    #[serde(default)]
    time_series: Vec<WireSeries>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireSeries {
    #[serde(default)]
    resource: Labels,
    #[serde(default)]
    metric: Labels,
    #[serde(default)]
    points: Vec<WirePoint>,
}

#[derive(Debug, Default, Deserialize)]
struct Labels {
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct WirePoint {
    value: WireValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireValue {
    // int64 values are JSON strings
    int64_value: Option<String>,
    double_value: Option<f64>,
}

impl WireSeries {
    fn into_series(self) -> Option<TimeSeries> {
        let point = self.points.into_iter().next()?;
        let value = match (point.value.int64_value, point.value.double_value) {
            (Some(v), _) => v.parse().ok()?,
            (None, Some(v)) => v.round() as i64,
            (None, None) => return None,
        };
        Some(TimeSeries {
            resource_labels: self.resource.labels,
            metric_labels: self.metric.labels,
            value,
        })
    }
}

impl Page for TimeSeriesList {
    type Item = WireSeries;
    fn into_parts(self) -> (Vec<WireSeries>, Option<String>) {
        (self.time_series, self.next_page_token)
    }
}
