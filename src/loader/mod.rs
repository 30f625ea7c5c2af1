//! Keyed loaders: how a cache fills a miss.
//!
//! ## Lifecycle
//!
//! ```text
//! Constructed --init--> Initialized --dispose--> Disposed
//!      |                                            ^
//!      +--------------------dispose-----------------+
//! ```
//!
//! Factories hand out `Constructed` loaders. The owning cache calls
//! [`KeyedLoader::init`] once it is alive and before it is published, and
//! [`KeyedLoader::dispose`] once while it is being torn down.
//!
//! ## Arguments
//!
//! Callers may pass an opaque [`LoadArgument`]. When they do, the cache calls
//! the `*_with` form of the load; otherwise the plain form. Only the concrete
//! loader interprets the argument.

mod binding;
mod properties_loader;

pub use binding::{LoaderBinding, LoaderState};
pub use properties_loader::{PropertiesLoader, PropertiesLoaderFactory};

use std::any::Any;
use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::cache::{Cache, CacheKey, CacheValue};
use crate::error::{CacheError, Result};
use crate::source::Properties;

/// Opaque extra input for a load.
pub type LoadArgument = dyn Any + Send + Sync;

/// Result of a batch load.
///
/// Keys the backing source does not know are simply absent from `values`.
/// Keys whose individual load failed are listed in `failures` instead, so
/// the cache can report them without mistaking them for misses.
#[derive(Debug)]
pub struct LoadedBatch<K, V> {
    pub values: HashMap<K, V>,
    pub failures: Vec<(K, CacheError)>,
}

impl<K, V> Default for LoadedBatch<K, V> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            failures: Vec::new(),
        }
    }
}

/// Produces values for keys a cache does not hold.
pub trait KeyedLoader<K: CacheKey, V: CacheValue>: Send + Sync {
    /// Stable identifier for diagnostics and factory lookup.
    fn name(&self) -> &str;

    /// One-time setup. The owning cache is alive and may be used.
    fn init(&self, _cache: &Cache<K, V>) -> Result<()> {
        Ok(())
    }

    /// One-time teardown. The owning cache is disposing and must not be
    /// used. May run without a preceding `init`.
    fn dispose(&self) {}

    /// Load one key. `Ok(None)` means the source has no value for it.
    fn load(&self, key: &K) -> Result<Option<V>>;

    /// Load one key with a caller-supplied argument.
    fn load_with(&self, key: &K, _argument: &LoadArgument) -> Result<Option<V>> {
        self.load(key)
    }

    /// Load many keys. The default loads them one by one and collects
    /// individual failures.
    fn load_all(&self, keys: &HashSet<K>) -> Result<LoadedBatch<K, V>> {
        let mut batch = LoadedBatch::default();
        for key in keys {
            match self.load(key) {
                Ok(Some(value)) => {
                    batch.values.insert(key.clone(), value);
                }
                Ok(None) => {}
                Err(e) => batch.failures.push((key.clone(), e)),
            }
        }
        Ok(batch)
    }

    /// Load many keys with a caller-supplied argument.
    fn load_all_with(&self, keys: &HashSet<K>, argument: &LoadArgument) -> Result<LoadedBatch<K, V>> {
        let mut batch = LoadedBatch::default();
        for key in keys {
            match self.load_with(key, argument) {
                Ok(Some(value)) => {
                    batch.values.insert(key.clone(), value);
                }
                Ok(None) => {}
                Err(e) => batch.failures.push((key.clone(), e)),
            }
        }
        Ok(batch)
    }

    /// Build an independent loader bound to `target`.
    fn clone_for(&self, _target: &Cache<K, V>) -> Result<Box<dyn KeyedLoader<K, V>>> {
        Err(CacheError::NotCloneable {
            kind: "loader",
            name: self.name().to_string(),
        })
    }
}

/// Builds loaders from configuration.
pub trait LoaderFactory<K: CacheKey, V: CacheValue>: Send + Sync {
    /// Provider-neutral construction from an environment map.
    fn create_loader(&self, environment: &Map<String, Value>) -> Result<Box<dyn KeyedLoader<K, V>>>;

    /// Engine-native construction for a specific cache.
    fn create_loader_for(
        &self,
        cache: &Cache<K, V>,
        properties: &Properties,
    ) -> Result<Box<dyn KeyedLoader<K, V>>>;
}

/// Pick `load` or `load_with` depending on whether an argument was given.
pub fn dispatch_load<K: CacheKey, V: CacheValue>(
    loader: &dyn KeyedLoader<K, V>,
    key: &K,
    argument: Option<&LoadArgument>,
) -> Result<Option<V>> {
    match argument {
        Some(argument) => loader.load_with(key, argument),
        None => loader.load(key),
    }
}

/// Pick `load_all` or `load_all_with` depending on whether an argument was
/// given.
pub fn dispatch_load_all<K: CacheKey, V: CacheValue>(
    loader: &dyn KeyedLoader<K, V>,
    keys: &HashSet<K>,
    argument: Option<&LoadArgument>,
) -> Result<LoadedBatch<K, V>> {
    match argument {
        Some(argument) => loader.load_all_with(keys, argument),
        None => loader.load_all(keys),
    }
}
