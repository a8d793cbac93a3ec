//! # CDN Resource Resolver
//!
//! Picks a concrete URL for each logical asset of the site (avatar, web
//! fonts, intro video, stylesheets) from an ordered list of CDN origins, and
//! falls back to the bundled local copy when no CDN answers in time.
//!
//! ## Features
//!
//! - Static resource registry, loadable from a JSON manifest
//! - Concurrent origin probing with a per-origin timeout and an overall ceiling
//! - Priority-first or first-healthy winner selection
//! - Per-resource resolution cache with lazy TTL expiry
//! - Aggregate health snapshot for status indicators
//!
//! ## Architecture
//!
//! ```text
//!   resolve(id) ──> ResolutionCache ──hit──> URL
//!                        │ miss
//!                        v
//!                 ResourceRegistry ──origins──> HealthProber (fan-out race)
//!                                                    │
//!                              HealthTable <──records┤
//!                                                    v
//!                                     winner ? remote URL : local URL
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use cdn_resolver::{CdnManager, HttpProbe, Origin, ResolverConfig, ResourceKind, ResourceRegistry};
//! use std::sync::Arc;
//!
//! # async fn example() -> cdn_resolver::Result<()> {
//! let mut registry = ResourceRegistry::new();
//! registry.register(
//!     "avatar",
//!     ResourceKind::Image,
//!     vec![
//!         Origin::new("jsdelivr", "https://cdn.jsdelivr.net/gh/folio/site@main/public"),
//!         Origin::local(""),
//!     ],
//! )?;
//!
//! let manager = CdnManager::new(registry, Arc::new(HttpProbe::new()), ResolverConfig::default());
//! let url = manager.resolve("avatar", &manager.default_options()).await?;
//! println!("avatar -> {}", url);
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod error;
mod health;
mod manager;
mod metrics;
mod probe;
mod registry;

pub mod testing;

pub use cache::{CacheStats, ResolutionCache, ResolutionEntry, Selection};
pub use config::{ResolverConfig, SelectionPolicy};
pub use error::{ProbeError, ResolverError, Result};
pub use health::{AggregateHealth, HealthTable};
pub use manager::{CdnManager, Resolution, ResolutionState, ResolveOptions};
pub use probe::{HealthProber, HealthRecord, HttpProbe, NetworkProbe, RaceOutcome};
pub use registry::{
    join_url, LogicalResource, Origin, RegistryManifest, ResourceDefinition, ResourceKind,
    ResourceRegistry, LOCAL_PROVIDER,
};
