//! The configured cache handle callers operate on.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, error};

use crate::error::{CacheError, Result};
use crate::events::{CacheEventListener, Element, NullEventSink};
use crate::isolation::{CacheExceptionHandler, IsolationWrapper, LoggingExceptionHandler};
use crate::loader::{
    KeyedLoader, LoadArgument, LoaderBinding, dispatch_load, dispatch_load_all,
};

use super::lifecycle::Lifecycle;
use super::{CacheKey, CacheSettings, CacheStatus, CacheValue, MokaStore, RemovalHook, RemovalKind, Store};

type Listener<K, V> = Arc<dyn CacheEventListener<K, V>>;

/// A named, configured cache.
///
/// Cloning is cheap and every clone refers to the same cache. Storage,
/// loader and listener failures are routed to the cache's exception handler
/// and surface as misses; lifecycle violations are returned as errors.
pub struct Cache<K: CacheKey, V: CacheValue> {
    inner: Arc<CacheInner<K, V>>,
}

struct CacheInner<K: CacheKey, V: CacheValue> {
    settings: Arc<CacheSettings>,
    lifecycle: Lifecycle,
    store: Box<dyn Store<K, V>>,
    loader: RwLock<Option<Arc<LoaderBinding<K, V>>>>,
    /// Shared by in-flight loads, exclusive while a loader is detached.
    dispatch: RwLock<()>,
    listeners: RwLock<Vec<Listener<K, V>>>,
    isolation: IsolationWrapper<K>,
}

impl<K: CacheKey, V: CacheValue> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: CacheKey, V: CacheValue> Cache<K, V> {
    /// Build a Moka-backed cache with the given handler.
    ///
    /// The cache starts `Uninitialized`; call [`Cache::initialise`] once any
    /// loader is attached.
    pub fn new(settings: CacheSettings, handler: Arc<dyn CacheExceptionHandler<K>>) -> Self {
        let settings = Arc::new(settings);
        let inner = Arc::new_cyclic(|weak: &Weak<CacheInner<K, V>>| {
            let hook = removal_hook(weak.clone());
            CacheInner {
                store: Box::new(MokaStore::new(&settings, Some(hook))),
                lifecycle: Lifecycle::new(settings.name()),
                loader: RwLock::new(None),
                dispatch: RwLock::new(()),
                listeners: RwLock::new(vec![Arc::new(NullEventSink::new())]),
                isolation: IsolationWrapper::new(Arc::clone(&settings), handler),
                settings,
            }
        });
        Self { inner }
    }

    /// Build a cache over a caller-supplied storage engine.
    ///
    /// Such engines report no expiries or evictions.
    pub fn with_store(
        settings: CacheSettings,
        store: Box<dyn Store<K, V>>,
        handler: Arc<dyn CacheExceptionHandler<K>>,
    ) -> Self {
        let settings = Arc::new(settings);
        Self {
            inner: Arc::new(CacheInner {
                store,
                lifecycle: Lifecycle::new(settings.name()),
                loader: RwLock::new(None),
                dispatch: RwLock::new(()),
                listeners: RwLock::new(vec![Arc::new(NullEventSink::new())]),
                isolation: IsolationWrapper::new(Arc::clone(&settings), handler),
                settings,
            }),
        }
    }

    /// Moka-backed cache that logs failures.
    pub fn standalone(settings: CacheSettings) -> Self {
        Self::new(settings, Arc::new(LoggingExceptionHandler))
    }

    pub fn name(&self) -> &str {
        self.inner.settings.name()
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    pub fn status(&self) -> CacheStatus {
        self.inner.lifecycle.status()
    }

    pub fn is_alive(&self) -> bool {
        self.status() == CacheStatus::Alive
    }

    /// Whether both handles refer to the same cache.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The storage engine as its concrete type, e.g. `MokaStore<K, V>`.
    pub fn unwrap<T: 'static>(&self) -> Option<&T> {
        self.inner.store.as_any().downcast_ref::<T>()
    }

    // ---- lifecycle ----

    /// Mark the cache alive and initialise its loader.
    ///
    /// The loader's `init` runs after the cache is alive, so it may use the
    /// cache; no load is dispatched to it until `init` returns.
    pub fn initialise(&self) -> Result<()> {
        self.inner
            .lifecycle
            .transition(CacheStatus::Uninitialized, CacheStatus::Alive)?;

        if let Some(binding) = self.loader_binding() {
            binding.init(self)?;
        }

        debug!("Cache '{}' is alive", self.name());
        Ok(())
    }

    /// Tear the cache down: dispose the loader and listeners, then release
    /// storage. Returns without doing anything if teardown already started.
    ///
    /// Waits for loads already in progress; must not be called from inside
    /// one of this cache's loads.
    pub fn dispose(&self) -> Result<()> {
        let lifecycle = &self.inner.lifecycle;
        let started = lifecycle
            .transition(CacheStatus::Alive, CacheStatus::Disposing)
            .or_else(|_| lifecycle.transition(CacheStatus::Uninitialized, CacheStatus::Disposing));
        if started.is_err() {
            return Ok(());
        }

        let binding = self.detach_loader(None);
        if let Some(binding) = binding {
            binding.dispose();
        }

        let listeners: Vec<_> = self.inner.listeners.write().drain(..).collect();
        for listener in listeners {
            listener.dispose();
        }

        if let Err(e) = self.inner.store.remove_all() {
            error!("Failed to release storage for cache '{}': {}", self.name(), e);
        }

        lifecycle.transition(CacheStatus::Disposing, CacheStatus::Disposed)?;
        debug!("Cache '{}' disposed", self.name());
        Ok(())
    }

    // ---- loaders ----

    fn loader_binding(&self) -> Option<Arc<LoaderBinding<K, V>>> {
        self.inner.loader.read().clone()
    }

    /// Swap the loader once no load is running, returning the old one.
    fn detach_loader(&self, next: Option<Arc<LoaderBinding<K, V>>>) -> Option<Arc<LoaderBinding<K, V>>> {
        let _dispatch = self.inner.dispatch.write();
        std::mem::replace(&mut *self.inner.loader.write(), next)
    }

    /// Name of the attached loader, if any.
    pub fn loader_name(&self) -> Option<String> {
        self.loader_binding().map(|b| b.name().to_string())
    }

    /// Attach a loader as-is, replacing (and disposing) any previous one.
    ///
    /// On a live cache the loader is initialised before it is installed.
    pub fn register_loader(&self, loader: Arc<dyn KeyedLoader<K, V>>) -> Result<()> {
        self.inner.lifecycle.check_operable("register_loader")?;

        let binding = Arc::new(LoaderBinding::new(loader));
        if self.is_alive() {
            binding.init(self)?;
        }

        debug!("Registered loader '{}' on cache '{}'", binding.name(), self.name());
        let previous = self.detach_loader(Some(binding));
        if let Some(previous) = previous {
            previous.dispose();
        }
        Ok(())
    }

    /// Attach a loader built from configuration.
    ///
    /// The template is cloned for this cache and then disposed; only legal
    /// before the cache is initialised.
    pub fn attach_declared_loader(&self, template: Box<dyn KeyedLoader<K, V>>) -> Result<()> {
        if self.status() != CacheStatus::Uninitialized {
            return Err(CacheError::illegal_state(
                self.name(),
                "declared loaders attach only before initialisation",
            ));
        }

        let template = LoaderBinding::new(Arc::from(template));
        let result = template.clone_into(self.status(), self);
        template.dispose();

        let binding = result?;
        let previous = self.detach_loader(Some(Arc::new(binding)));
        if let Some(previous) = previous {
            previous.dispose();
        }
        Ok(())
    }

    // ---- listeners ----

    pub fn register_listener(&self, listener: Arc<dyn CacheEventListener<K, V>>) -> Result<()> {
        self.inner.lifecycle.check_operable("register_listener")?;
        debug!("Registered listener '{}' on cache '{}'", listener.name(), self.name());
        self.inner.listeners.write().push(listener);
        Ok(())
    }

    /// Swap out every listener; the old ones are disposed.
    pub fn replace_listeners(&self, listeners: Vec<Arc<dyn CacheEventListener<K, V>>>) -> Result<()> {
        self.inner.lifecycle.check_operable("replace_listeners")?;
        let previous = std::mem::replace(&mut *self.inner.listeners.write(), listeners);
        for listener in previous {
            listener.dispose();
        }
        Ok(())
    }

    pub fn listener_names(&self) -> Vec<String> {
        self.inner
            .listeners
            .read()
            .iter()
            .map(|l| l.name().to_string())
            .collect()
    }

    /// Tell every listener. Listener failures go to the handler.
    fn notify<F>(&self, key: Option<&K>, f: F) -> Result<()>
    where
        F: Fn(&dyn CacheEventListener<K, V>) -> Result<()>,
    {
        // Snapshot so listeners may register others without deadlocking.
        let listeners: Vec<_> = self.inner.listeners.read().clone();
        for listener in listeners {
            self.inner.isolation.run(key, || f(listener.as_ref()))?;
        }
        Ok(())
    }

    // ---- operations ----

    /// Get a value, loading it on a miss with no argument.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        self.get_inner(key, None)
    }

    /// Get a value, loading it on a miss with `argument`.
    pub fn get_with(&self, key: &K, argument: &LoadArgument) -> Result<Option<V>> {
        self.get_inner(key, Some(argument))
    }

    fn get_inner(&self, key: &K, argument: Option<&LoadArgument>) -> Result<Option<V>> {
        self.inner.lifecycle.check_operable("get")?;

        let isolation = &self.inner.isolation;
        if let Some(Some(value)) = isolation.run(Some(key), || self.inner.store.get(key))? {
            return Ok(Some(value));
        }

        let dispatch = self.inner.dispatch.read_recursive();
        let Some(binding) = self.loader_binding().filter(|b| b.is_ready()) else {
            return Ok(None);
        };

        let loaded = isolation
            .run(Some(key), || dispatch_load(binding.loader().as_ref(), key, argument))?
            .flatten();
        drop(dispatch);

        match loaded {
            Some(value) => {
                self.put(key.clone(), value.clone())?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Get many values, batch-loading the misses with no argument.
    pub fn get_all<I>(&self, keys: I) -> Result<HashMap<K, V>>
    where
        I: IntoIterator<Item = K>,
    {
        self.get_all_inner(keys, None)
    }

    /// Get many values, batch-loading the misses with `argument`.
    pub fn get_all_with<I>(&self, keys: I, argument: &LoadArgument) -> Result<HashMap<K, V>>
    where
        I: IntoIterator<Item = K>,
    {
        self.get_all_inner(keys, Some(argument))
    }

    fn get_all_inner<I>(&self, keys: I, argument: Option<&LoadArgument>) -> Result<HashMap<K, V>>
    where
        I: IntoIterator<Item = K>,
    {
        self.inner.lifecycle.check_operable("get_all")?;

        let isolation = &self.inner.isolation;
        let mut found = HashMap::new();
        let mut missing = HashSet::new();
        for key in keys {
            match isolation.run(Some(&key), || self.inner.store.get(&key))? {
                Some(Some(value)) => {
                    found.insert(key, value);
                }
                _ => {
                    missing.insert(key);
                }
            }
        }

        let dispatch = self.inner.dispatch.read_recursive();
        let binding = self.loader_binding().filter(|b| b.is_ready());
        let (Some(binding), false) = (binding, missing.is_empty()) else {
            return Ok(found);
        };

        let Some(batch) =
            isolation.run(None, || dispatch_load_all(binding.loader().as_ref(), &missing, argument))?
        else {
            return Ok(found);
        };
        drop(dispatch);

        for (key, failure) in &batch.failures {
            if failure.is_recoverable() {
                isolation.report(Some(key), failure);
            } else {
                return Err(failure.clone());
            }
        }

        for (key, value) in batch.values {
            self.put(key.clone(), value.clone())?;
            found.insert(key, value);
        }
        Ok(found)
    }

    /// Store a value, notifying listeners of a put or an update.
    pub fn put(&self, key: K, value: V) -> Result<()> {
        self.inner.lifecycle.check_operable("put")?;

        let stored = self
            .inner
            .isolation
            .run(Some(&key), || self.inner.store.put(key.clone(), value.clone()))?;

        match stored {
            Some(true) => self.notify(Some(&key), |l| {
                l.notify_element_updated(self, Element::new(&key, Some(&value)))
            }),
            Some(false) => self.notify(Some(&key), |l| {
                l.notify_element_put(self, Element::new(&key, Some(&value)))
            }),
            None => Ok(()),
        }
    }

    pub fn put_all<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Remove a key, returning its value if it was present.
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        self.inner.lifecycle.check_operable("remove")?;

        let removed = self
            .inner
            .isolation
            .run(Some(key), || self.inner.store.remove(key))?
            .flatten();

        if let Some(value) = &removed {
            self.notify(Some(key), |l| {
                l.notify_element_removed(self, Element::new(key, Some(value)))
            })?;
        }
        Ok(removed)
    }

    pub fn remove_all(&self) -> Result<()> {
        self.inner.lifecycle.check_operable("remove_all")?;

        if self
            .inner
            .isolation
            .run(None, || self.inner.store.remove_all())?
            .is_some()
        {
            self.notify(None, |l| l.notify_remove_all(self))?;
        }
        Ok(())
    }

    pub fn contains_key(&self, key: &K) -> Result<bool> {
        self.inner.lifecycle.check_operable("contains_key")?;
        Ok(self.inner.store.contains_key(key))
    }

    pub fn len(&self) -> u64 {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Relay engine expiries and evictions to the cache's listeners.
fn removal_hook<K: CacheKey, V: CacheValue>(weak: Weak<CacheInner<K, V>>) -> RemovalHook<K, V> {
    Arc::new(move |key: &K, value: &V, kind: RemovalKind| {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let cache = Cache { inner };
        let element = Element::new(key, Some(value));
        let result = cache.notify(Some(key), |l| match kind {
            RemovalKind::Expired => l.notify_element_expired(&cache, element),
            RemovalKind::Evicted => l.notify_element_evicted(&cache, element),
        });
        if let Err(e) = result {
            error!("Listener failed on {:?} in cache '{}': {}", kind, cache.name(), e);
        }
    })
}

impl<K: CacheKey, V: CacheValue> std::fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name())
            .field("status", &self.status())
            .field("loader", &self.loader_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::{FailureRecorder, RecordingExceptionHandler};
    use crate::loader::LoadedBatch;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorded_cache(name: &str, recorder: &FailureRecorder<u32>) -> Cache<u32, String> {
        Cache::new(
            CacheSettings::named(name),
            Arc::new(RecordingExceptionHandler::new(recorder.clone())),
        )
    }

    /// Loads `key` as its decimal text, fails for keys >= 100, logs calls.
    #[derive(Default)]
    struct ScriptedLoader {
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedLoader {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl KeyedLoader<u32, String> for ScriptedLoader {
        fn name(&self) -> &str {
            "scripted"
        }

        fn load(&self, key: &u32) -> Result<Option<String>> {
            self.calls.lock().push(format!("load({key})"));
            if *key >= 100 {
                return Err(CacheError::loader("scripted", format!("no key {key}")));
            }
            Ok(Some(key.to_string()))
        }

        fn load_with(&self, key: &u32, argument: &LoadArgument) -> Result<Option<String>> {
            let arg = argument.downcast_ref::<&str>().copied().unwrap_or("?");
            self.calls.lock().push(format!("load_with({key},{arg})"));
            Ok(Some(format!("{key}-{arg}")))
        }

        fn load_all(&self, keys: &HashSet<u32>) -> Result<LoadedBatch<u32, String>> {
            self.calls.lock().push(format!("load_all({})", keys.len()));
            let mut batch = LoadedBatch::default();
            for key in keys {
                match key {
                    k if *k >= 100 => batch
                        .failures
                        .push((*k, CacheError::loader("scripted", "batch"))),
                    k if *k >= 50 => {}
                    k => {
                        batch.values.insert(*k, k.to_string());
                    }
                }
            }
            Ok(batch)
        }

        fn load_all_with(
            &self,
            keys: &HashSet<u32>,
            _argument: &LoadArgument,
        ) -> Result<LoadedBatch<u32, String>> {
            self.calls.lock().push(format!("load_all_with({})", keys.len()));
            let mut batch = LoadedBatch::default();
            batch.values.extend(keys.iter().map(|k| (*k, format!("{k}!"))));
            Ok(batch)
        }
    }

    fn alive_with_loader(
        recorder: &FailureRecorder<u32>,
    ) -> (Cache<u32, String>, Arc<ScriptedLoader>) {
        let cache = recorded_cache("loaded", recorder);
        let loader = Arc::new(ScriptedLoader::default());
        cache.register_loader(loader.clone()).unwrap();
        cache.initialise().unwrap();
        (cache, loader)
    }

    #[test]
    fn test_get_loads_once_then_hits() {
        let recorder = FailureRecorder::new();
        let (cache, loader) = alive_with_loader(&recorder);

        assert_eq!(cache.get(&7).unwrap(), Some("7".into()));
        assert_eq!(cache.get(&7).unwrap(), Some("7".into()));
        assert_eq!(loader.calls(), vec!["load(7)"]);
        assert!(cache.contains_key(&7).unwrap());
    }

    #[test]
    fn test_argument_selects_load_form() {
        let recorder = FailureRecorder::new();
        let (cache, loader) = alive_with_loader(&recorder);

        cache.get(&1).unwrap();
        assert_eq!(cache.get_with(&2, &"X").unwrap(), Some("2-X".into()));
        cache.get_all([3, 4]).unwrap();
        let loaded = cache.get_all_with([5], &"Y").unwrap();

        assert_eq!(loaded[&5], "5!");
        assert_eq!(
            loader.calls(),
            vec!["load(1)", "load_with(2,X)", "load_all(2)", "load_all_with(1)"]
        );
    }

    #[test]
    fn test_loader_failures_recorded_in_order() {
        let recorder = FailureRecorder::new();
        let (cache, _loader) = alive_with_loader(&recorder);
        recorder.reset_counters();

        for key in [101, 102, 103] {
            assert_eq!(cache.get(&key).unwrap(), None);
        }

        let failures = recorder.failures();
        assert_eq!(failures.len(), 3);
        let keys: Vec<_> = failures.iter().map(|f| f.key).collect();
        assert_eq!(keys, vec![Some(101), Some(102), Some(103)]);
        assert!(failures.iter().all(|f| f.cache == "loaded"));
        assert!(failures.iter().all(|f| matches!(f.failure, CacheError::Loader { .. })));

        recorder.reset_counters();
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_batch_misses_and_failures_are_distinct() {
        let recorder = FailureRecorder::new();
        let (cache, _loader) = alive_with_loader(&recorder);
        cache.put(1, "cached".into()).unwrap();

        let found = cache.get_all([1, 2, 60, 150]).unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[&1], "cached");
        assert_eq!(found[&2], "2");
        assert!(!found.contains_key(&60));
        let failures = recorder.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].key, Some(150));
    }

    #[test]
    fn test_no_loader_means_plain_miss() {
        let recorder = FailureRecorder::new();
        let cache = recorded_cache("plain", &recorder);
        cache.initialise().unwrap();
        assert_eq!(cache.get(&1).unwrap(), None);
        assert!(cache.get_all([1, 2]).unwrap().is_empty());
        assert!(recorder.is_empty());
    }

    /// Uses the cache from `init` and again from `dispose`.
    #[derive(Default)]
    struct ReentrantLoader {
        cache: Mutex<Option<Cache<u32, String>>>,
        loads: AtomicUsize,
        dispose_result: Mutex<Option<bool>>,
    }

    impl KeyedLoader<u32, String> for ReentrantLoader {
        fn name(&self) -> &str {
            "reentrant"
        }

        fn init(&self, cache: &Cache<u32, String>) -> Result<()> {
            // A miss from inside init must not reach this loader.
            assert_eq!(cache.get(&9)?, None);
            cache.put(0, "seeded".into())?;
            *self.cache.lock() = Some(cache.clone());
            Ok(())
        }

        fn dispose(&self) {
            let ok = self
                .cache
                .lock()
                .as_ref()
                .map(|c| c.get(&0).is_ok())
                .unwrap_or(true);
            *self.dispose_result.lock() = Some(ok);
        }

        fn load(&self, key: &u32) -> Result<Option<String>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Some(key.to_string()))
        }
    }

    #[test]
    fn test_init_may_use_cache_and_dispose_may_not() {
        let recorder = FailureRecorder::new();
        let cache = recorded_cache("reentrant", &recorder);
        let loader = Arc::new(ReentrantLoader::default());
        cache.register_loader(loader.clone()).unwrap();
        cache.initialise().unwrap();

        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
        assert_eq!(cache.get(&0).unwrap(), Some("seeded".into()));

        cache.dispose().unwrap();
        assert_eq!(*loader.dispose_result.lock(), Some(false));
        assert_eq!(cache.status(), CacheStatus::Disposed);
    }

    #[test]
    fn test_operations_after_dispose_are_fatal() {
        let recorder = FailureRecorder::new();
        let (cache, _loader) = alive_with_loader(&recorder);
        cache.dispose().unwrap();
        cache.dispose().unwrap();

        assert!(matches!(cache.get(&1), Err(CacheError::IllegalState { .. })));
        assert!(matches!(cache.put(1, "x".into()), Err(CacheError::IllegalState { .. })));
        assert!(matches!(cache.remove(&1), Err(CacheError::IllegalState { .. })));
        assert!(recorder.is_empty());
    }

    /// Parks inside `load` until released.
    struct GatedLoader {
        started: std::sync::Barrier,
        release: std::sync::Barrier,
        log: Mutex<Vec<&'static str>>,
    }

    impl KeyedLoader<u32, String> for GatedLoader {
        fn name(&self) -> &str {
            "gated"
        }

        fn dispose(&self) {
            self.log.lock().push("dispose");
        }

        fn load(&self, key: &u32) -> Result<Option<String>> {
            self.log.lock().push("load-start");
            self.started.wait();
            self.release.wait();
            self.log.lock().push("load-end");
            Ok(Some(key.to_string()))
        }
    }

    #[test]
    fn test_dispose_waits_for_running_load() {
        let cache: Cache<u32, String> = Cache::standalone(CacheSettings::named("gated"));
        let loader = Arc::new(GatedLoader {
            started: std::sync::Barrier::new(2),
            release: std::sync::Barrier::new(2),
            log: Mutex::new(Vec::new()),
        });
        cache.register_loader(loader.clone()).unwrap();
        cache.initialise().unwrap();

        std::thread::scope(|s| {
            let load = s.spawn(|| cache.get(&1));
            loader.started.wait();

            let dispose = s.spawn(|| cache.dispose());
            std::thread::sleep(std::time::Duration::from_millis(50));
            assert_eq!(*loader.log.lock(), vec!["load-start"]);

            loader.release.wait();
            let _ = load.join().unwrap();
            dispose.join().unwrap().unwrap();
        });

        assert_eq!(*loader.log.lock(), vec!["load-start", "load-end", "dispose"]);
        assert_eq!(cache.status(), CacheStatus::Disposed);
    }

    #[test]
    fn test_initialise_twice_is_fatal() {
        let cache: Cache<u32, String> = Cache::standalone(CacheSettings::named("twice"));
        cache.initialise().unwrap();
        assert!(matches!(cache.initialise(), Err(CacheError::IllegalState { .. })));
    }

    #[test]
    fn test_register_loader_replaces_and_disposes_previous() {
        struct Named(&'static str, AtomicUsize);

        impl KeyedLoader<u32, String> for Named {
            fn name(&self) -> &str {
                self.0
            }

            fn dispose(&self) {
                self.1.fetch_add(1, Ordering::SeqCst);
            }

            fn load(&self, _key: &u32) -> Result<Option<String>> {
                Ok(Some(self.0.to_string()))
            }
        }

        let cache: Cache<u32, String> = Cache::standalone(CacheSettings::named("swap"));
        cache.initialise().unwrap();

        let first = Arc::new(Named("first", AtomicUsize::new(0)));
        cache.register_loader(first.clone()).unwrap();
        cache.register_loader(Arc::new(Named("second", AtomicUsize::new(0)))).unwrap();

        assert_eq!(first.1.load(Ordering::SeqCst), 1);
        assert_eq!(cache.loader_name().as_deref(), Some("second"));
        assert_eq!(cache.get(&1).unwrap(), Some("second".into()));
    }

    #[test]
    fn test_declared_loader_is_cloned_not_shared() {
        let cache: Cache<String, String> = Cache::standalone(CacheSettings::named("declared"));
        let values = [("k".to_string(), "v".to_string())].into_iter().collect();
        let template = crate::loader::PropertiesLoader::new("template", values);

        cache.attach_declared_loader(Box::new(template)).unwrap();
        cache.initialise().unwrap();

        assert_eq!(cache.loader_name().as_deref(), Some("properties:declared"));
        assert_eq!(cache.get(&"k".to_string()).unwrap(), Some("v".into()));
        assert!(matches!(
            cache.attach_declared_loader(Box::new(ScriptedLoaderForStrings)),
            Err(CacheError::IllegalState { .. })
        ));
    }

    struct ScriptedLoaderForStrings;

    impl KeyedLoader<String, String> for ScriptedLoaderForStrings {
        fn name(&self) -> &str {
            "strings"
        }

        fn load(&self, key: &String) -> Result<Option<String>> {
            Ok(Some(key.clone()))
        }
    }

    #[test]
    fn test_declared_loader_that_cannot_clone() {
        let cache: Cache<String, String> = Cache::standalone(CacheSettings::named("stuck"));
        let err = cache
            .attach_declared_loader(Box::new(ScriptedLoaderForStrings))
            .unwrap_err();
        assert!(matches!(err, CacheError::NotCloneable { .. }));
        assert_eq!(cache.loader_name(), None);
    }

    /// Logs events; clones start with an empty log.
    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<String>>,
        fail_on_put: bool,
    }

    impl CacheEventListener<u32, String> for EventLog {
        fn name(&self) -> &str {
            "event-log"
        }

        fn notify_element_put(&self, _cache: &Cache<u32, String>, e: Element<'_, u32, String>) -> Result<()> {
            self.events.lock().push(format!("put {}", e.key));
            if self.fail_on_put {
                return Err(CacheError::listener("event-log", "refused"));
            }
            Ok(())
        }

        fn notify_element_updated(&self, _cache: &Cache<u32, String>, e: Element<'_, u32, String>) -> Result<()> {
            self.events.lock().push(format!("update {}", e.key));
            Ok(())
        }

        fn notify_element_removed(&self, _cache: &Cache<u32, String>, e: Element<'_, u32, String>) -> Result<()> {
            self.events.lock().push(format!("remove {}", e.key));
            Ok(())
        }

        fn notify_remove_all(&self, _cache: &Cache<u32, String>) -> Result<()> {
            self.events.lock().push("remove_all".into());
            Ok(())
        }

        fn clone_listener(&self) -> Result<Box<dyn CacheEventListener<u32, String>>> {
            Ok(Box::new(EventLog {
                events: Mutex::new(Vec::new()),
                fail_on_put: self.fail_on_put,
            }))
        }
    }

    #[test]
    fn test_listener_sees_every_mutation() {
        let recorder = FailureRecorder::new();
        let cache = recorded_cache("observed", &recorder);
        cache.initialise().unwrap();
        let log = Arc::new(EventLog::default());
        cache.register_listener(log.clone()).unwrap();

        cache.put(1, "a".into()).unwrap();
        cache.put(1, "b".into()).unwrap();
        assert_eq!(cache.remove(&1).unwrap(), Some("b".into()));
        assert_eq!(cache.remove(&1).unwrap(), None);
        cache.remove_all().unwrap();

        assert_eq!(
            *log.events.lock(),
            vec!["put 1", "update 1", "remove 1", "remove_all"]
        );
        assert_eq!(cache.listener_names(), vec!["null", "event-log"]);
    }

    #[test]
    fn test_listener_failure_is_isolated() {
        let recorder = FailureRecorder::new();
        let cache = recorded_cache("isolated", &recorder);
        cache.initialise().unwrap();
        cache
            .register_listener(Arc::new(EventLog {
                fail_on_put: true,
                ..Default::default()
            }))
            .unwrap();

        cache.put(5, "x".into()).unwrap();

        assert_eq!(cache.get(&5).unwrap(), Some("x".into()));
        let failures = recorder.failures();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].failure, CacheError::Listener { .. }));
        assert_eq!(failures[0].key, Some(5));
    }

    #[test]
    fn test_listener_clone_is_independent() {
        let original = EventLog::default();
        let copy = original.clone_listener().unwrap();
        let cache: Cache<u32, String> = Cache::standalone(CacheSettings::named("c"));

        copy.notify_element_put(&cache, Element::new(&1, None)).unwrap();

        assert!(original.events.lock().is_empty());
    }

    #[test]
    fn test_replace_listeners_drops_null_sink() {
        let cache: Cache<u32, String> = Cache::standalone(CacheSettings::named("replaced"));
        cache
            .replace_listeners(vec![Arc::new(EventLog::default())])
            .unwrap();
        assert_eq!(cache.listener_names(), vec!["event-log"]);
    }

    #[test]
    fn test_unwrap_exposes_native_store() {
        let cache: Cache<u32, String> = Cache::standalone(CacheSettings::named("native"));
        cache.initialise().unwrap();
        cache.put(3, "three".into()).unwrap();

        let store = cache.unwrap::<MokaStore<u32, String>>().unwrap();
        assert_eq!(store.native().get(&3), Some("three".into()));
        assert!(cache.unwrap::<String>().is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let cache: Cache<u32, String> = Cache::standalone(CacheSettings::named("shared"));
        let other = cache.clone();
        cache.initialise().unwrap();
        other.put(1, "x".into()).unwrap();
        assert!(cache.ptr_eq(&other));
        assert_eq!(cache.len(), 1);
    }
}
