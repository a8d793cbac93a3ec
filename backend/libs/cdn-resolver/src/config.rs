//! Per-deployment resolver settings.
//!
//! Values come from `CDN_*` environment variables (optionally via a `.env`
//! file); anything unset keeps its default.

use crate::error::{ResolverError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a winner is picked when several origins answer within one resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Registry order decides: a healthy origin wins once every
    /// higher-priority probe has come back unhealthy.
    #[default]
    PriorityFirst,
    /// The first healthy responder wins regardless of its priority.
    FirstHealthy,
}

impl SelectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriorityFirst => "priority_first",
            Self::FirstHealthy => "first_healthy",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// TTL for a resolution that picked a healthy remote origin
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// TTL for a resolution that fell back to local assets
    #[serde(default = "default_fallback_ttl_secs")]
    pub fallback_ttl_secs: u64,
    /// Upper bound for a single origin probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Wall-clock ceiling for a whole resolution
    #[serde(default = "default_resolution_ceiling_ms")]
    pub resolution_ceiling_ms: u64,
    #[serde(default = "default_local_base_path")]
    pub local_base_path: String,
    #[serde(default)]
    pub selection_policy: SelectionPolicy,
    /// 0 disables the background sweep of expired cache entries
    #[serde(default)]
    pub sweep_interval_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    1800 // 30 minutes
}

fn default_fallback_ttl_secs() -> u64 {
    60
}

fn default_probe_timeout_ms() -> u64 {
    3000
}

// Probes run concurrently, so the ceiling only binds when it is the shorter bound
fn default_resolution_ceiling_ms() -> u64 {
    2000
}

fn default_local_base_path() -> String {
    "/static".to_string()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            fallback_ttl_secs: default_fallback_ttl_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            resolution_ceiling_ms: default_resolution_ceiling_ms(),
            local_base_path: default_local_base_path(),
            selection_policy: SelectionPolicy::default(),
            sweep_interval_secs: 0,
        }
    }
}

impl ResolverConfig {
    /// Load from `CDN_*` environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit set of `CDN_*` key/value pairs
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::prefixed("CDN_").from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout_ms == 0 {
            return Err(ResolverError::config("probe_timeout_ms must be greater than 0"));
        }
        if self.resolution_ceiling_ms == 0 {
            return Err(ResolverError::config(
                "resolution_ceiling_ms must be greater than 0",
            ));
        }
        if self.fallback_ttl_secs >= self.cache_ttl_secs {
            return Err(ResolverError::config(format!(
                "fallback_ttl_secs ({}) must be shorter than cache_ttl_secs ({})",
                self.fallback_ttl_secs, self.cache_ttl_secs
            )));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn fallback_ttl(&self) -> Duration {
        Duration::from_secs(self.fallback_ttl_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn resolution_ceiling(&self) -> Duration {
        Duration::from_millis(self.resolution_ceiling_ms)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ResolverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_ttl(), Duration::from_secs(1800));
        assert_eq!(config.fallback_ttl(), Duration::from_secs(60));
        assert!(config.resolution_ceiling() < config.probe_timeout());
        assert_eq!(config.selection_policy, SelectionPolicy::PriorityFirst);
        assert!(config.sweep_interval().is_none());
    }

    #[test]
    fn test_from_vars_overrides_defaults() {
        let config = ResolverConfig::from_vars(vars(&[
            ("CDN_CACHE_TTL_SECS", "600"),
            ("CDN_PROBE_TIMEOUT_MS", "750"),
            ("CDN_LOCAL_BASE_PATH", "/assets"),
            ("CDN_SELECTION_POLICY", "first_healthy"),
            ("CDN_SWEEP_INTERVAL_SECS", "30"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.cache_ttl_secs, 600);
        assert_eq!(config.probe_timeout(), Duration::from_millis(750));
        assert_eq!(config.resolution_ceiling_ms, 2000);
        assert_eq!(config.local_base_path, "/assets");
        assert_eq!(config.selection_policy, SelectionPolicy::FirstHealthy);
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_from_vars_rejects_garbage() {
        let result = ResolverConfig::from_vars(vars(&[("CDN_PROBE_TIMEOUT_MS", "soon")]));
        assert!(matches!(result, Err(ResolverError::Config(_))));
    }

    #[test]
    fn test_fallback_ttl_must_be_shorter() {
        let config = ResolverConfig {
            cache_ttl_secs: 60,
            fallback_ttl_secs: 60,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ResolverError::Config(_))));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let config = ResolverConfig {
            probe_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ResolverConfig {
            resolution_ceiling_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
