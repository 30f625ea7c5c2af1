//! Cache module - named cache managers over Moka.
//!
//! ## Architecture
//!
//! - `CacheManagerRegistry` - resolves manager names to managers, once per name
//! - `CacheManager` - the caches one merged configuration declares
//! - `Cache` - one configured cache: storage, loader, listeners, isolation
//! - `CacheSettings` - resolved, immutable per-cache configuration
//! - `Store` / `MokaStore` - the storage engine seam and its default
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = CacheManagerRegistry::<String, String>::builder(base_source)
//!     .named_source("reporting", reporting_source)
//!     .loader_factory("properties", PropertiesLoaderFactory)
//!     .build();
//!
//! let manager = registry.get_manager(Some("reporting"))?;
//! if let Some(cache) = manager.get_cache("sampleCache")? {
//!     cache.put("k".into(), "v".into())?;
//! }
//! ```

mod config;
mod duration;
mod handle;
mod lifecycle;
mod manager;
mod registry;
mod store;

pub use config::{CacheSettings, DEFAULT_MAX_ENTRIES};
pub use duration::{ExpiryDuration, ExpiryType, TimeUnit};
pub use handle::Cache;
pub use lifecycle::CacheStatus;
pub use manager::CacheManager;
pub use registry::{CacheManagerRegistry, RegistryBuilder};
pub use store::{MAX_ENGINE_EXPIRY, MokaStore, RemovalHook, RemovalKind, Store};

use std::fmt::Debug;
use std::hash::Hash;

/// Bounds every cache key satisfies.
pub trait CacheKey: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

/// Bounds every cache value satisfies.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}
