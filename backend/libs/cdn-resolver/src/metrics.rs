/// Prometheus metrics for resolution, probing and caching
#[cfg(feature = "metrics")]
use prometheus::{register_int_counter_vec, IntCounterVec};

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;

#[cfg(feature = "metrics")]
static PROBES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cdn_resolver_probes_total",
        "Total number of origin probes",
        &["provider", "result"]
    )
    .expect("Failed to register probes metric")
});

#[cfg(feature = "metrics")]
static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cdn_resolver_cache_lookups_total",
        "Total number of resolution cache lookups",
        &["result"]
    )
    .expect("Failed to register cache lookups metric")
});

#[cfg(feature = "metrics")]
static RESOLUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cdn_resolver_resolutions_total",
        "Total number of resolutions by terminal state",
        &["state"]
    )
    .expect("Failed to register resolutions metric")
});

#[cfg(feature = "metrics")]
pub fn record_probe(provider: &str, healthy: bool) {
    let result = if healthy { "healthy" } else { "unhealthy" };
    PROBES.with_label_values(&[provider, result]).inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_probe(_provider: &str, _healthy: bool) {}

#[cfg(feature = "metrics")]
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    CACHE_LOOKUPS.with_label_values(&[result]).inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_cache_lookup(_hit: bool) {}

#[cfg(feature = "metrics")]
pub fn record_resolution(state: &str) {
    RESOLUTIONS.with_label_values(&[state]).inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_resolution(_state: &str) {}
