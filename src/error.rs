//! Error types for fleetmon
//!
//! ## Table of Contents
//! - **FleetError**: Main error enum covering all failure modes
//! - **ProviderError**: Classified failure from an upstream provider call
//! - **Result**: Type alias for `Result<T, FleetError>`

use thiserror::Error;

/// Result type alias for fleetmon operations
pub type Result<T> = std::result::Result<T, FleetError>;

/// Main error type for fleetmon operations
#[derive(Error, Debug)]
pub enum FleetError {
    /// Configuration error during startup
    #[error("configuration error: {0}")]
    Config(String),

    /// A catalog needed for the whole run could not be read
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Time-series data could not be read for a project
    #[error("metrics unavailable for project {project}: {reason}")]
    MetricsUnavailable {
        /// Project whose metrics failed
        project: String,
        /// Upstream failure
        reason: String,
    },

    /// Environment listing failed for a reason other than authorization
    #[error("inventory error: {0}")]
    Inventory(String),

    /// Report sink failure
    #[error("storage error: {0}")]
    Storage(String),

    /// HTTP transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Prometheus registry failure
    #[error("metrics error: {0}")]
    Metrics(String),
}

impl FleetError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an access denied error
    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    /// Create a metrics unavailable error
    pub fn metrics_unavailable(project: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MetricsUnavailable {
            project: project.into(),
            reason: reason.into(),
        }
    }

    /// Create an inventory error
    pub fn inventory(msg: impl Into<String>) -> Self {
        Self::Inventory(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Whether this error aborts a whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AccessDenied(_) | Self::Config(_))
    }
}

impl From<reqwest::Error> for FleetError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<prometheus::Error> for FleetError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}

impl From<ProviderError> for FleetError {
    fn from(err: ProviderError) -> Self {
        Self::Network(err.to_string())
    }
}

/// Failure reported by an upstream provider, classified by what the caller can do about it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The execution identity is not allowed to read the resource (HTTP 403)
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The location does not exist or is not offered for this project (HTTP 400/404)
    #[error("location unavailable: {0}")]
    LocationUnavailable(String),

    /// Anything else: transport errors, 5xx, malformed payloads
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Classify an HTTP status and body
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            403 => Self::PermissionDenied(format!("HTTP 403: {}", body)),
            400 | 404 => Self::LocationUnavailable(format!("HTTP {}: {}", status, body)),
            _ => Self::Other(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status(status.as_u16(), err.to_string()),
            None => Self::Other(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ProviderError::from_status(403, "denied"),
            ProviderError::PermissionDenied(_)
        ));
        assert!(matches!(
            ProviderError::from_status(404, "no such location"),
            ProviderError::LocationUnavailable(_)
        ));
        assert!(matches!(
            ProviderError::from_status(400, "bad location"),
            ProviderError::LocationUnavailable(_)
        ));
        assert!(matches!(
            ProviderError::from_status(503, "unavailable"),
            ProviderError::Other(_)
        ));
    }

    #[test]
    fn test_fatality() {
        assert!(FleetError::access_denied("no regions").is_fatal());
        assert!(!FleetError::metrics_unavailable("p1", "403").is_fatal());
        assert!(!FleetError::inventory("boom").is_fatal());
    }
}
