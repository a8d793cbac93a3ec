//! CDN manager: turns a logical resource id into a concrete URL.
//!
//! Cache first; on a miss every remote origin is probed concurrently under
//! one wall-clock ceiling, and the bundled local copy is served when none of
//! them answers in time.

use crate::cache::{CacheStats, ResolutionCache, ResolutionEntry, Selection};
use crate::config::ResolverConfig;
use crate::error::{ProbeError, ResolverError, Result};
use crate::health::{AggregateHealth, HealthTable};
use crate::metrics;
use crate::probe::{HealthProber, NetworkProbe};
use crate::registry::{LogicalResource, Origin, ResourceRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle of one resolution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Cache miss, probes in flight
    Pending,
    /// A remote origin answered healthy
    ResolvedRemote,
    /// No remote origin answered; serving bundled assets
    ResolvedLocal,
    /// No remote origin answered and fallback was disabled
    Failed,
}

impl ResolutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ResolvedRemote => "resolved_remote",
            Self::ResolvedLocal => "resolved_local",
            Self::Failed => "failed",
        }
    }
}

/// Per-call resolution options
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Serve the local copy when no remote origin is healthy
    pub enable_fallback: bool,
    /// Root under which bundled assets are served
    pub local_base_path: String,
    /// Read and write the resolution cache
    pub cache_resolution: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            enable_fallback: true,
            local_base_path: "/static".to_string(),
            cache_resolution: true,
        }
    }
}

impl ResolveOptions {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            local_base_path: config.local_base_path.clone(),
            ..Default::default()
        }
    }

    pub fn without_fallback(mut self) -> Self {
        self.enable_fallback = false;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache_resolution = false;
        self
    }

    pub fn with_local_base_path(mut self, path: impl Into<String>) -> Self {
        self.local_base_path = path.into();
        self
    }
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub url: String,
    pub state: ResolutionState,
    /// Selected remote origin; `None` for the local fallback
    pub origin: Option<Origin>,
    pub from_cache: bool,
}

/// Resolves logical resources to URLs.
///
/// Constructed explicitly by the application and shared behind an `Arc`;
/// each instance owns its own cache and health table.
pub struct CdnManager {
    registry: Arc<ResourceRegistry>,
    prober: HealthProber,
    cache: Arc<ResolutionCache>,
    health: Arc<HealthTable>,
    config: ResolverConfig,
}

impl CdnManager {
    pub fn new(
        registry: ResourceRegistry,
        probe: Arc<dyn NetworkProbe>,
        config: ResolverConfig,
    ) -> Self {
        info!(
            "Initializing CDN manager: resources={}, policy={}, probe_timeout={}ms, ceiling={}ms, ttl={}s, fallback_ttl={}s",
            registry.len(),
            config.selection_policy.as_str(),
            config.probe_timeout_ms,
            config.resolution_ceiling_ms,
            config.cache_ttl_secs,
            config.fallback_ttl_secs
        );

        Self {
            registry: Arc::new(registry),
            prober: HealthProber::new(probe, config.probe_timeout()),
            cache: Arc::new(ResolutionCache::new()),
            health: Arc::new(HealthTable::new()),
            config,
        }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Options derived from this manager's configuration
    pub fn default_options(&self) -> ResolveOptions {
        ResolveOptions::from_config(&self.config)
    }

    /// URL to fetch for `id`
    pub async fn resolve(&self, id: &str, options: &ResolveOptions) -> Result<String> {
        self.resolve_detailed(id, options)
            .await
            .map(|resolution| resolution.url)
    }

    /// Like [`resolve`](Self::resolve), also reporting how the URL was chosen
    pub async fn resolve_detailed(
        &self,
        id: &str,
        options: &ResolveOptions,
    ) -> Result<Resolution> {
        let resource = self.registry.get(id)?;

        if options.cache_resolution {
            if let Some(resolution) = self.cached_resolution(&resource, options) {
                return Ok(resolution);
            }
        }

        // Writes from this attempt are dropped if `id` is invalidated meanwhile
        let epoch = self.cache.epoch(id);
        let remote = resource.remote_origins();
        debug!(
            resource = %id,
            state = ResolutionState::Pending.as_str(),
            candidates = remote.len(),
            "Resolving resource"
        );

        let outcome = self
            .prober
            .race(
                resource.path(),
                &remote,
                self.config.resolution_ceiling(),
                self.config.selection_policy,
            )
            .await;
        self.health.record_all(id, outcome.records);

        if let Some(record) = outcome.winner {
            let url = record.origin.url_for(resource.path());
            info!(
                resource = %id,
                provider = %record.origin.provider,
                latency_ms = record.latency.map(|l| l.as_millis() as u64),
                "Resolved to remote origin"
            );

            if options.cache_resolution {
                self.cache.put_if_current(
                    id,
                    ResolutionEntry {
                        resource_id: id.to_string(),
                        selection: Selection::Remote(record.origin.clone()),
                        url: url.clone(),
                        resolved_at: record.checked_at,
                        ttl: self.config.cache_ttl(),
                    },
                    epoch,
                );
            }

            metrics::record_resolution(ResolutionState::ResolvedRemote.as_str());
            return Ok(Resolution {
                url,
                state: ResolutionState::ResolvedRemote,
                origin: Some(record.origin),
                from_cache: false,
            });
        }

        if !options.enable_fallback {
            error!(
                resource = %id,
                attempted = remote.len(),
                state = ResolutionState::Failed.as_str(),
                "No healthy origin and fallback disabled"
            );
            metrics::record_resolution(ResolutionState::Failed.as_str());
            return Err(ResolverError::resolution(id, remote.len()));
        }

        let url = resource.local_url(&options.local_base_path);
        if remote.is_empty() {
            debug!(resource = %id, "Resource is served locally only");
        } else {
            warn!(
                resource = %id,
                attempted = remote.len(),
                url = %url,
                "No healthy CDN origin, falling back to local assets"
            );
        }

        if options.cache_resolution {
            self.cache.put_if_current(
                id,
                ResolutionEntry {
                    resource_id: id.to_string(),
                    selection: Selection::LocalFallback,
                    url: url.clone(),
                    resolved_at: Instant::now(),
                    ttl: self.config.fallback_ttl(),
                },
                epoch,
            );
        }

        metrics::record_resolution(ResolutionState::ResolvedLocal.as_str());
        Ok(Resolution {
            url,
            state: ResolutionState::ResolvedLocal,
            origin: None,
            from_cache: false,
        })
    }

    fn cached_resolution(
        &self,
        resource: &LogicalResource,
        options: &ResolveOptions,
    ) -> Option<Resolution> {
        let id = resource.id();
        let Some(entry) = self.cache.get(id) else {
            metrics::record_cache_lookup(false);
            debug!(resource = %id, "Resolution cache miss");
            return None;
        };

        let resolution = match &entry.selection {
            Selection::Remote(origin) => {
                // A failure reported after the decision overrides it
                let failed_since = self.health.get(id, &origin.provider).is_some_and(|record| {
                    !record.healthy && record.checked_at >= entry.resolved_at
                });
                if failed_since {
                    debug!(
                        resource = %id,
                        provider = %origin.provider,
                        "Cached origin failed since resolution"
                    );
                    self.cache.invalidate(id);
                    metrics::record_cache_lookup(false);
                    return None;
                }

                Resolution {
                    url: entry.url.clone(),
                    state: ResolutionState::ResolvedRemote,
                    origin: Some(origin.clone()),
                    from_cache: true,
                }
            }
            // Callers that refuse the local copy must go back to the network
            Selection::LocalFallback if !options.enable_fallback => {
                debug!(resource = %id, "Ignoring cached local fallback, fallback disabled");
                metrics::record_cache_lookup(false);
                return None;
            }
            Selection::LocalFallback => Resolution {
                url: resource.local_url(&options.local_base_path),
                state: ResolutionState::ResolvedLocal,
                origin: None,
                from_cache: true,
            },
        };

        metrics::record_cache_lookup(true);
        debug!(resource = %id, url = %resolution.url, "Resolution cache hit");
        Some(resolution)
    }

    /// Snapshot of CDN reachability; no side effects
    pub fn aggregate_health(&self) -> AggregateHealth {
        self.health.aggregate()
    }

    /// Forget the cached decision for `id` so the next call re-probes
    pub fn invalidate(&self, id: &str) -> bool {
        self.cache.invalidate(id)
    }

    /// Report that the URL handed out for `id` failed to load at point of use.
    ///
    /// Marks the cached origin unhealthy and invalidates the cache entry.
    pub fn report_load_failure(&self, id: &str) -> Result<()> {
        self.registry.get(id)?;

        if let Some(origin) = self.cache.get(id).and_then(|entry| entry.origin().cloned()) {
            self.health
                .mark_unhealthy(id, &origin, ProbeError::network("load failed at point of use"));
        }
        self.cache.invalidate(id);
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Periodically purge expired cache entries.
    ///
    /// Nothing runs until this is called; abort the returned handle to stop.
    pub fn start_background_sweep(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        info!("Starting resolution cache sweep every {:?}", interval);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            // First tick completes immediately
            interval_timer.tick().await;

            loop {
                interval_timer.tick().await;
                cache.purge_expired();
            }
        })
    }
}
