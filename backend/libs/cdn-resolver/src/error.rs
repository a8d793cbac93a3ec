//! Error types for resource resolution

use std::time::Duration;
use thiserror::Error;

/// Result type for resolver operations
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Errors surfaced to callers of the registry and the CDN manager
#[derive(Debug, Error)]
pub enum ResolverError {
    /// Malformed or incomplete resource registration
    #[error("Invalid resource configuration: {0}")]
    Config(String),

    /// Requested resource id was never registered
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// No healthy origin answered and local fallback was disabled
    #[error("No healthy origin for resource '{id}' ({attempted} remote origins probed)")]
    Resolution { id: String, attempted: usize },
}

impl ResolverError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Create a resolution error
    pub fn resolution(id: impl Into<String>, attempted: usize) -> Self {
        Self::Resolution {
            id: id.into(),
            attempted,
        }
    }

    /// Whether a later call may succeed without a configuration change
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Resolution { .. })
    }
}

impl From<envy::Error> for ResolverError {
    fn from(err: envy::Error) -> Self {
        ResolverError::Config(err.to_string())
    }
}

/// Failure of a single origin probe.
///
/// Absorbed by the prober into an unhealthy [`HealthRecord`](crate::HealthRecord);
/// never returned from [`CdnManager::resolve`](crate::CdnManager::resolve).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Origin answered with status {0}")]
    Status(u16),
}

impl ProbeError {
    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
            Self::Status(_) => "status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ResolverError::resolution("avatar", 2);
        assert_eq!(
            err.to_string(),
            "No healthy origin for resource 'avatar' (2 remote origins probed)"
        );

        let err = ResolverError::not_found("hero");
        assert_eq!(err.to_string(), "Resource not found: hero");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ResolverError::resolution("avatar", 1).is_retryable());
        assert!(!ResolverError::config("empty origins").is_retryable());
        assert!(!ResolverError::not_found("avatar").is_retryable());
    }

    #[test]
    fn test_probe_error_labels() {
        assert_eq!(ProbeError::Timeout(Duration::from_secs(1)).as_str(), "timeout");
        assert_eq!(ProbeError::network("refused").as_str(), "network");
        assert_eq!(ProbeError::Status(404).as_str(), "status");
    }
}
