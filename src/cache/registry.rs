//! Cache manager registry - resolves manager names to managers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, error, info};

use crate::error::{CacheError, Result};
use crate::isolation::{CacheExceptionHandler, ExceptionHandlerFactory, LoggingExceptionHandler};
use crate::loader::{KeyedLoader, LoaderFactory};
use crate::source::{ConfigSource, RawCacheConfig, merge_sources};

use super::{Cache, CacheKey, CacheManager, CacheSettings, CacheValue};

/// Central registry resolving manager names to [`CacheManager`]s.
///
/// The first request for a name merges the named source (if one is
/// registered under that name) over the base source and builds every
/// declared cache. Later requests, including racing first requests from
/// other threads, get the very same manager.
///
/// ## Example
///
/// ```rust,ignore
/// let registry = CacheManagerRegistry::<String, String>::builder(base)
///     .named_source("reporting", reporting)
///     .build();
///
/// let a = registry.get_manager(Some("reporting"))?;
/// let b = registry.get_manager(Some("reporting"))?;
/// assert!(a.ptr_eq(&b));
/// ```
pub struct CacheManagerRegistry<K: CacheKey, V: CacheValue> {
    inner: Arc<RegistryInner<K, V>>,
}

type ManagerSlot<K, V> = Arc<OnceCell<CacheManager<K, V>>>;

struct RegistryInner<K: CacheKey, V: CacheValue> {
    base: Arc<dyn ConfigSource>,
    named: HashMap<String, Arc<dyn ConfigSource>>,
    loader_factories: HashMap<String, Arc<dyn LoaderFactory<K, V>>>,
    handler_factories: HashMap<String, Arc<dyn ExceptionHandlerFactory<K>>>,
    default_handler: Arc<dyn CacheExceptionHandler<K>>,
    managers: DashMap<Option<String>, ManagerSlot<K, V>>,
}

impl<K: CacheKey, V: CacheValue> Clone for CacheManagerRegistry<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`CacheManagerRegistry`].
pub struct RegistryBuilder<K: CacheKey, V: CacheValue> {
    base: Arc<dyn ConfigSource>,
    named: HashMap<String, Arc<dyn ConfigSource>>,
    loader_factories: HashMap<String, Arc<dyn LoaderFactory<K, V>>>,
    handler_factories: HashMap<String, Arc<dyn ExceptionHandlerFactory<K>>>,
    default_handler: Arc<dyn CacheExceptionHandler<K>>,
}

impl<K: CacheKey, V: CacheValue> RegistryBuilder<K, V> {
    /// Register a source that overrides the base for manager `name`.
    #[must_use]
    pub fn named_source(mut self, name: impl Into<String>, source: impl ConfigSource + 'static) -> Self {
        self.named.insert(name.into(), Arc::new(source));
        self
    }

    /// Register a loader factory configuration can refer to by `name`.
    #[must_use]
    pub fn loader_factory(
        mut self,
        name: impl Into<String>,
        factory: impl LoaderFactory<K, V> + 'static,
    ) -> Self {
        self.loader_factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register an exception handler factory configuration can refer to by `name`.
    #[must_use]
    pub fn handler_factory(
        mut self,
        name: impl Into<String>,
        factory: impl ExceptionHandlerFactory<K> + 'static,
    ) -> Self {
        self.handler_factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Handler for caches that declare none. Defaults to logging.
    #[must_use]
    pub fn default_handler(mut self, handler: Arc<dyn CacheExceptionHandler<K>>) -> Self {
        self.default_handler = handler;
        self
    }

    pub fn build(self) -> CacheManagerRegistry<K, V> {
        info!(
            "Cache manager registry initialized ({} named sources, {} loader factories)",
            self.named.len(),
            self.loader_factories.len()
        );
        CacheManagerRegistry {
            inner: Arc::new(RegistryInner {
                base: self.base,
                named: self.named,
                loader_factories: self.loader_factories,
                handler_factories: self.handler_factories,
                default_handler: self.default_handler,
                managers: DashMap::new(),
            }),
        }
    }
}

impl<K: CacheKey, V: CacheValue> CacheManagerRegistry<K, V> {
    /// Start building a registry over the given base source.
    pub fn builder(base: impl ConfigSource + 'static) -> RegistryBuilder<K, V> {
        RegistryBuilder {
            base: Arc::new(base),
            named: HashMap::new(),
            loader_factories: HashMap::new(),
            handler_factories: HashMap::new(),
            default_handler: Arc::new(LoggingExceptionHandler),
        }
    }

    /// Get the manager for `name`, resolving it on first use.
    ///
    /// `None` is the default manager. Configuration errors are returned and
    /// nothing is memoized, so a later call retries.
    pub fn get_manager(&self, name: Option<&str>) -> Result<CacheManager<K, V>> {
        let slot = self
            .inner
            .managers
            .entry(name.map(str::to_string))
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        // Racing callers block here until the first one finishes building.
        let manager = slot.get_or_try_init(|| self.build_manager(name))?;
        Ok(manager.clone())
    }

    /// Provider-neutral lookup: manager by name, then cache by name.
    pub fn get_cache(&self, manager: Option<&str>, cache_name: &str) -> Result<Option<Cache<K, V>>> {
        self.get_manager(manager)?.get_cache(cache_name)
    }

    /// Names of every manager resolved so far; the default manager is `None`.
    pub fn manager_names(&self) -> Vec<Option<String>> {
        self.inner
            .managers
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn build_manager(&self, name: Option<&str>) -> Result<CacheManager<K, V>> {
        let label = name.unwrap_or("default");
        let named = name.and_then(|n| self.inner.named.get(n));
        match named {
            Some(source) => debug!("Resolving manager '{}' from source '{}'", label, source.name()),
            None => debug!("Resolving manager '{}' from base configuration", label),
        }

        let merged = merge_sources(&*self.inner.base, named.map(|s| &**s))?;

        let mut caches = BTreeMap::new();
        let mut failed = BTreeMap::new();
        for (cache_name, raw) in &merged {
            let built = match self.build_cache(name, cache_name, raw) {
                Ok(built) => built,
                Err(e) => {
                    // Caches already built have initialised loaders.
                    for cache in caches.values() {
                        dispose_quietly(cache);
                    }
                    return Err(e);
                }
            };
            match built {
                Ok(cache) => {
                    caches.insert(cache_name.clone(), cache);
                }
                Err(e) => {
                    error!("Cache '{}' in manager '{}' unusable: {}", cache_name, label, e);
                    failed.insert(cache_name.clone(), e);
                }
            }
        }

        Ok(CacheManager::new(name.map(str::to_string), caches, failed))
    }

    /// Build one cache.
    ///
    /// The outer error is a configuration problem that sinks the whole
    /// manager; the inner one only makes this cache unusable.
    fn build_cache(
        &self,
        manager: Option<&str>,
        cache_name: &str,
        raw: &RawCacheConfig,
    ) -> Result<Result<Cache<K, V>>> {
        let settings = CacheSettings::resolve(manager, cache_name, raw);
        let handler = self.resolve_handler(&settings)?;

        let loader_factory = match settings.loader() {
            Some(decl) => {
                let factory = self.inner.loader_factories.get(&decl.factory).ok_or_else(|| {
                    CacheError::UnknownLoaderFactory {
                        cache: cache_name.to_string(),
                        factory: decl.factory.clone(),
                    }
                })?;
                Some((Arc::clone(factory), decl.clone(), decl.properties()?))
            }
            None => None,
        };

        let cache = Cache::new(settings, handler);
        debug!("Creating cache: {}", cache_name);

        if let Some((factory, decl, properties)) = loader_factory {
            let template: Result<Box<dyn KeyedLoader<K, V>>> = if decl.properties.is_some() {
                factory.create_loader_for(&cache, &properties)
            } else {
                factory.create_loader(&decl.environment)
            };
            let attached = template.and_then(|t| cache.attach_declared_loader(t));
            if let Err(e) = attached {
                dispose_quietly(&cache);
                return Ok(Err(e));
            }
        }

        if let Err(e) = cache.initialise() {
            dispose_quietly(&cache);
            return Ok(Err(e));
        }
        Ok(Ok(cache))
    }

    fn resolve_handler(&self, settings: &CacheSettings) -> Result<Arc<dyn CacheExceptionHandler<K>>> {
        let Some(decl) = settings.exception_handler() else {
            return Ok(Arc::clone(&self.inner.default_handler));
        };

        let factory = self.inner.handler_factories.get(&decl.factory).ok_or_else(|| {
            CacheError::UnknownHandlerFactory {
                cache: settings.name().to_string(),
                factory: decl.factory.clone(),
            }
        })?;
        factory.create_handler(&decl.properties()?)
    }
}

fn dispose_quietly<K: CacheKey, V: CacheValue>(cache: &Cache<K, V>) {
    if let Err(e) = cache.dispose() {
        error!("Failed to dispose cache '{}': {}", cache.name(), e);
    }
}

impl<K: CacheKey, V: CacheValue> std::fmt::Debug for CacheManagerRegistry<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManagerRegistry")
            .field("base", &self.inner.base.name())
            .field("named_sources", &self.inner.named.keys().collect::<Vec<_>>())
            .field("managers", &self.manager_names())
            .finish()
    }
}
