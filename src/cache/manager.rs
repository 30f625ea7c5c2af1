//! A resolved cache manager.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::error::{CacheError, Result};

use super::{Cache, CacheKey, CacheValue};

/// The caches one merged configuration declares.
///
/// Handed out by [`CacheManagerRegistry`](super::CacheManagerRegistry);
/// every clone refers to the same manager. A cache whose loader could not be
/// attached is remembered with its error so that only lookups of that cache
/// fail.
pub struct CacheManager<K: CacheKey, V: CacheValue> {
    inner: Arc<ManagerInner<K, V>>,
}

struct ManagerInner<K: CacheKey, V: CacheValue> {
    name: Option<String>,
    caches: BTreeMap<String, Cache<K, V>>,
    failed: BTreeMap<String, CacheError>,
}

impl<K: CacheKey, V: CacheValue> Clone for CacheManager<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: CacheKey, V: CacheValue> CacheManager<K, V> {
    pub(crate) fn new(
        name: Option<String>,
        caches: BTreeMap<String, Cache<K, V>>,
        failed: BTreeMap<String, CacheError>,
    ) -> Self {
        info!(
            "Cache manager '{}' ready with {} caches ({} failed)",
            name.as_deref().unwrap_or("default"),
            caches.len(),
            failed.len()
        );
        Self {
            inner: Arc::new(ManagerInner {
                name,
                caches,
                failed,
            }),
        }
    }

    /// `None` for the default manager.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Look up a declared cache.
    ///
    /// Returns `Ok(None)` for names the configuration never declared, and
    /// the attach error for a declared cache that could not be built.
    pub fn get_cache(&self, cache_name: &str) -> Result<Option<Cache<K, V>>> {
        if let Some(failure) = self.inner.failed.get(cache_name) {
            return Err(failure.clone());
        }

        let cache = self.inner.caches.get(cache_name).cloned();
        if cache.is_none() {
            debug!(
                "Cache '{}' not declared in manager '{}'",
                cache_name,
                self.name().unwrap_or("default")
            );
        }
        Ok(cache)
    }

    /// Names of every usable cache, sorted.
    pub fn cache_names(&self) -> Vec<String> {
        self.inner.caches.keys().cloned().collect()
    }

    /// Declared caches that failed to build, with why.
    pub fn failed_caches(&self) -> Vec<(String, CacheError)> {
        self.inner
            .failed
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether both handles refer to the same manager.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Dispose every cache. The manager itself stays registered.
    pub fn shutdown(&self) {
        for (name, cache) in &self.inner.caches {
            if let Err(e) = cache.dispose() {
                error!("Failed to dispose cache '{}': {}", name, e);
            }
        }
        info!(
            "Cache manager '{}' shut down",
            self.name().unwrap_or("default")
        );
    }
}

impl<K: CacheKey, V: CacheValue> std::fmt::Debug for CacheManager<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("name", &self.name())
            .field("cache_names", &self.inner.caches.keys().collect::<Vec<_>>())
            .field("failed", &self.inner.failed.keys().collect::<Vec<_>>())
            .finish()
    }
}
