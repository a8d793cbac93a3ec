use cdn_resolver::{AggregateHealth, CacheStats, Resolution, ResolverError, ResourceKind};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Resolution outcome of one resource
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub id: String,
    pub kind: ResourceKind,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResourceStatus {
    pub fn from_result(
        id: String,
        kind: ResourceKind,
        result: Result<Resolution, ResolverError>,
    ) -> Self {
        match result {
            Ok(resolution) => Self {
                id,
                kind,
                state: resolution.state.as_str(),
                url: Some(resolution.url),
                provider: resolution.origin.map(|origin| origin.provider),
                error: None,
            },
            Err(e) => Self {
                id,
                kind,
                state: "failed",
                url: None,
                provider: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheSummary {
    pub total_entries: usize,
    pub active_entries: usize,
}

impl From<CacheStats> for CacheSummary {
    fn from(stats: CacheStats) -> Self {
        Self {
            total_entries: stats.total_entries,
            active_entries: stats.active_entries,
        }
    }
}

/// Full status report printed by the binary
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub resources: Vec<ResourceStatus>,
    pub health: AggregateHealth,
    pub cache: CacheSummary,
}

impl StatusReport {
    pub fn failed_count(&self) -> usize {
        self.resources
            .iter()
            .filter(|resource| resource.error.is_some())
            .count()
    }
}
