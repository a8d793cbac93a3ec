mod config;
mod report;

use anyhow::Context;
use cdn_resolver::testing::ScriptedProbe;
use cdn_resolver::{
    CdnManager, HttpProbe, NetworkProbe, RegistryManifest, ResolverConfig, ResourceRegistry,
};
use config::AppConfig;
use report::{ResourceStatus, StatusReport};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let app_config = AppConfig::from_env().context("Invalid ASSET_STATUS_* configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    if app_config.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    tracing::info!("Starting asset-status");

    let resolver_config = ResolverConfig::from_env().context("Invalid CDN_* configuration")?;
    let manifest = RegistryManifest::from_file(&app_config.manifest_path)
        .with_context(|| format!("Failed to load manifest {}", app_config.manifest_path))?;
    let registry = ResourceRegistry::from_manifest(manifest)?;

    let probe: Arc<dyn NetworkProbe> = if app_config.offline {
        tracing::warn!("Offline mode: no CDN will be contacted");
        Arc::new(ScriptedProbe::new())
    } else {
        Arc::new(HttpProbe::new())
    };

    let sweep_interval = resolver_config.sweep_interval();
    let manager = Arc::new(CdnManager::new(registry, probe, resolver_config));
    let sweep = sweep_interval.map(|interval| manager.start_background_sweep(interval));

    let options = manager.default_options();
    let resources: Vec<_> = manager
        .registry()
        .ids()
        .into_iter()
        .filter_map(|id| manager.registry().get(&id).ok())
        .collect();

    let statuses = futures::future::join_all(resources.iter().map(|resource| {
        let manager = Arc::clone(&manager);
        let options = options.clone();
        async move {
            let result = manager.resolve_detailed(resource.id(), &options).await;
            ResourceStatus::from_result(resource.id().to_string(), resource.kind(), result)
        }
    }))
    .await;

    let report = StatusReport {
        generated_at: chrono::Utc::now(),
        resources: statuses,
        health: manager.aggregate_health(),
        cache: manager.cache_stats().into(),
    };

    if let Some(handle) = sweep {
        handle.abort();
    }

    println!("{}", serde_json::to_string_pretty(&report)?);

    tracing::info!(
        resources = report.resources.len(),
        failed = report.failed_count(),
        any_reachable = report.health.any_reachable,
        degraded = report.health.degraded_resources.len(),
        "Asset status complete"
    );

    if report.failed_count() > 0 {
        anyhow::bail!("{} resources could not be resolved", report.failed_count());
    }
    Ok(())
}
