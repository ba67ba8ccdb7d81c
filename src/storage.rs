//! Report sinks
//!
//! ## Table of Contents
//! - **ReportSink**: Trait for report storage backends
//! - **MemoryStore**: In-memory sink (default, tests)
//! - **FileStore**: Writes reports into a local directory
//! - **GcsStore**: Uploads reports to a Cloud Storage bucket

use crate::error::{FleetError, Result};
use crate::provider::GcpClient;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Content type of rendered reports
pub const HTML_CONTENT_TYPE: &str = "text/html";

/// Trait for report storage backends
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Store a rendered report under `object_name`, replacing any previous one
    async fn store(&self, object_name: &str, html: &str) -> Result<()>;

    /// Sink name for logging
    fn name(&self) -> &str;
}

/// In-memory sink
#[derive(Debug, Default)]
pub struct MemoryStore {
    reports: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Last report stored under `object_name`
    pub async fn get(&self, object_name: &str) -> Option<String> {
        self.reports.read().await.get(object_name).cloned()
    }
}

#[async_trait]
impl ReportSink for MemoryStore {
    async fn store(&self, object_name: &str, html: &str) -> Result<()> {
        let mut reports = self.reports.write().await;
        reports.insert(object_name.to_string(), html.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Directory-backed sink
///
/// Each object becomes one file named after it.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path an object is written to
    pub fn path_for(&self, object_name: &str) -> Result<PathBuf> {
        let name = Path::new(object_name);
        let plain = name.components().count() == 1 && name.file_name().is_some();
        if !plain {
            return Err(FleetError::storage(format!(
                "Invalid object name for file store: {}",
                object_name
            )));
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl ReportSink for FileStore {
    async fn store(&self, object_name: &str, html: &str) -> Result<()> {
        let path = self.path_for(object_name)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| FleetError::storage(format!("Failed to create dir: {}", e)))?;
        tokio::fs::write(&path, html)
            .await
            .map_err(|e| FleetError::storage(format!("Failed to write report: {}", e)))?;

        debug!(path = %path.display(), bytes = html.len(), "Report written");
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Cloud Storage sink
pub struct GcsStore {
    client: GcpClient,
    bucket: String,
}

impl GcsStore {
    /// Create a sink writing into `bucket`
    pub fn new(client: GcpClient, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Target bucket
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ReportSink for GcsStore {
    async fn store(&self, object_name: &str, html: &str) -> Result<()> {
        info!(bucket = %self.bucket, object = %object_name, bytes = html.len(), "Saving report");
        self.client
            .upload_object(&self.bucket, object_name, HTML_CONTENT_TYPE, html.to_string())
            .await
            .map_err(|e| FleetError::storage(e.to_string()))
    }

    fn name(&self) -> &str {
        "gcs"
    }
}

/// Type alias for boxed sink
pub type BoxedReportSink = Arc<dyn ReportSink>;

/// Create a memory sink
pub fn memory_sink() -> BoxedReportSink {
    Arc::new(MemoryStore::new()) as BoxedReportSink
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::gcp::GcpEndpoints;
    use crate::provider::TokenSource;

    #[tokio::test]
    async fn test_memory_store_overwrites() {
        let store = MemoryStore::new();

        store.store("report.html", "<html>1</html>").await.unwrap();
        store.store("report.html", "<html>2</html>").await.unwrap();

        assert_eq!(store.get("report.html").await.as_deref(), Some("<html>2</html>"));
        assert!(store.get("other.html").await.is_none());
    }

    #[tokio::test]
    async fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("reports"));

        store.store("report.html", "<html></html>").await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("reports/report.html")).unwrap();
        assert_eq!(written, "<html></html>");
    }

    #[tokio::test]
    async fn test_file_store_rejects_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        for name in ["../escape.html", "nested/report.html", "/abs.html", ""] {
            let err = store.store(name, "x").await.unwrap_err();
            assert!(matches!(err, FleetError::Storage(_)), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_gcs_store_maps_errors() {
        let client = GcpClient::new(TokenSource::Anonymous).unwrap().with_endpoints(GcpEndpoints {
            storage_upload: "http://127.0.0.1:1".to_string(),
            ..GcpEndpoints::default()
        });
        let store = GcsStore::new(client, "reports-bucket");

        assert_eq!(store.bucket(), "reports-bucket");
        let err = store.store("report.html", "<html></html>").await.unwrap_err();
        assert!(matches!(err, FleetError::Storage(_)));
    }
}
