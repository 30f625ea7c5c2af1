//! cache-bridge - resolve a cache manager and report its caches.
//!
//! Reads the JSON document named by `CACHE_BRIDGE_CONFIG`, resolves the
//! manager named by `CACHE_BRIDGE_MANAGER` (or the default manager) and logs
//! every cache's resolved settings.

mod config;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cache_bridge::cache::CacheManagerRegistry;
use cache_bridge::loader::PropertiesLoaderFactory;
use cache_bridge::source::ConfigDocument;
use cache_bridge::ExpiryType;
use config::Config;

fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cache_bridge=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = Config::from_env()?;
    info!("Using cache configuration {}", config.config_path.display());

    let document = ConfigDocument::parse(&config.read_document()?)?;
    let (base, named) = document.into_sources();

    let mut builder = CacheManagerRegistry::<String, String>::builder(base)
        .loader_factory("properties", PropertiesLoaderFactory);
    for (name, source) in named {
        builder = builder.named_source(name, source);
    }
    let registry = builder.build();

    let manager = registry.get_manager(config.manager.as_deref())?;
    let label = manager.name().unwrap_or("default");

    for name in manager.cache_names() {
        let Some(cache) = manager.get_cache(&name)? else {
            continue;
        };
        let settings = cache.settings();
        info!(
            "[{}] {}: store_by_value={} accessed={:?} modified={:?} overflow_to_disk={} max_entries={} loader={}",
            label,
            name,
            settings.store_by_value(),
            settings.expiry(ExpiryType::Accessed),
            settings.expiry(ExpiryType::Modified),
            settings.overflow_to_disk(),
            settings.max_entries(),
            cache.loader_name().as_deref().unwrap_or("none"),
        );
    }

    for (name, failure) in manager.failed_caches() {
        warn!("[{}] {}: unusable: {}", label, name, failure);
    }

    manager.shutdown();
    Ok(())
}
