//! Storage engine seam and the Moka-backed default.

use std::any::Any;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use moka::notification::RemovalCause;
use moka::sync::Cache as MokaCache;
use tracing::debug;

use crate::error::Result;

use super::{CacheSettings, ExpiryType};

/// Why the engine dropped an entry on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalKind {
    Expired,
    Evicted,
}

/// Callback the engine uses to report expiries and evictions.
pub type RemovalHook<K, V> = Arc<dyn Fn(&K, &V, RemovalKind) + Send + Sync>;

/// The storage operations a [`Cache`](super::Cache) sits in front of.
pub trait Store<K, V>: Send + Sync + 'static {
    fn get(&self, key: &K) -> Result<Option<V>>;

    /// Store a value. Returns `true` when an existing entry was replaced.
    fn put(&self, key: K, value: V) -> Result<bool>;

    fn remove(&self, key: &K) -> Result<Option<V>>;

    fn remove_all(&self) -> Result<()>;

    fn contains_key(&self, key: &K) -> bool;

    /// Number of entries. May lag behind concurrent writes.
    fn len(&self) -> u64;

    /// Escape hatch to the concrete engine, see [`Cache::unwrap`](super::Cache::unwrap).
    fn as_any(&self) -> &dyn Any;
}

/// Store backed by a `moka::sync::Cache`.
///
/// ACCESSED expiry maps to Moka's time-to-idle and MODIFIED expiry to
/// time-to-live. Cloning is cheap and shares the underlying cache.
pub struct MokaStore<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: MokaCache<K, V>,
}

impl<K, V> Clone for MokaStore<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> MokaStore<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Build a store for the given settings.
    ///
    /// `hook` receives expiries and size evictions; explicit removals and
    /// replacements are reported by the cache itself.
    pub fn new(settings: &CacheSettings, hook: Option<RemovalHook<K, V>>) -> Self {
        let mut builder = MokaCache::builder()
            .name(settings.name())
            .max_capacity(settings.max_entries());

        if let Some(tti) = engine_expiry(settings, ExpiryType::Accessed) {
            builder = builder.time_to_idle(tti);
        }

        if let Some(ttl) = engine_expiry(settings, ExpiryType::Modified) {
            builder = builder.time_to_live(ttl);
        }

        if let Some(hook) = hook {
            builder = builder.eviction_listener(move |key: Arc<K>, value: V, cause| {
                let kind = match cause {
                    RemovalCause::Expired => RemovalKind::Expired,
                    RemovalCause::Size => RemovalKind::Evicted,
                    RemovalCause::Explicit | RemovalCause::Replaced => return,
                };
                hook(&key, &value, kind);
            });
        }

        Self {
            inner: builder.build(),
        }
    }

    /// The native Moka cache.
    pub fn native(&self) -> &MokaCache<K, V> {
        &self.inner
    }
}

/// Longest expiry Moka accepts (1000 years).
pub const MAX_ENGINE_EXPIRY: Duration = Duration::from_secs(1000 * 365 * 24 * 3600);

/// The configured expiry as Moka should see it.
///
/// Anything longer than [`MAX_ENGINE_EXPIRY`] is treated as eternal.
fn engine_expiry(settings: &CacheSettings, expiry_type: ExpiryType) -> Option<Duration> {
    let duration = settings.expiry(expiry_type).to_std()?;
    if duration > MAX_ENGINE_EXPIRY {
        debug!(
            "Cache '{}': {} expiry of {:?} exceeds the engine limit, treating as eternal",
            settings.name(),
            expiry_type,
            duration
        );
        return None;
    }
    Some(duration)
}

impl<K, V> Store<K, V> for MokaStore<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.inner.get(key))
    }

    fn put(&self, key: K, value: V) -> Result<bool> {
        // Check and write in one step so racing puts see each other.
        let mut replaced = false;
        self.inner.entry(key).and_upsert_with(|existing| {
            replaced = existing.is_some();
            value
        });
        Ok(replaced)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        Ok(self.inner.remove(key))
    }

    fn remove_all(&self) -> Result<()> {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
        Ok(())
    }

    fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<K, V> std::fmt::Debug for MokaStore<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaStore")
            .field("name", &self.inner.name())
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}
