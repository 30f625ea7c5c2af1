//! Cache event observers.
//!
//! Listeners are told about every put, update, removal, expiry and eviction
//! on the caches they are registered with. They never influence the values
//! a cache returns; a failing listener is isolated like a failing loader.
//!
//! Add a custom observer by implementing [`CacheEventListener`] and calling
//! [`Cache::register_listener`](crate::cache::Cache::register_listener).

mod null_sink;

pub use null_sink::NullEventSink;

use crate::cache::{Cache, CacheKey, CacheValue};
use crate::error::{CacheError, Result};

/// The entry an event is about. `value` is absent when the engine no
/// longer has it (e.g. removing a key that was not present).
#[derive(Debug)]
pub struct Element<'a, K, V> {
    pub key: &'a K,
    pub value: Option<&'a V>,
}

impl<'a, K, V> Element<'a, K, V> {
    pub fn new(key: &'a K, value: Option<&'a V>) -> Self {
        Self { key, value }
    }
}

// Manual impls so that K and V need not be Clone/Copy.
impl<K, V> Clone for Element<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for Element<'_, K, V> {}

/// Observer of cache lifecycle events.
///
/// Every method has a no-op default, so implementors only override what they
/// care about.
pub trait CacheEventListener<K: CacheKey, V: CacheValue>: Send + Sync {
    /// Identifier used in diagnostics.
    fn name(&self) -> &str;

    fn notify_element_put(&self, _cache: &Cache<K, V>, _element: Element<'_, K, V>) -> Result<()> {
        Ok(())
    }

    fn notify_element_updated(
        &self,
        _cache: &Cache<K, V>,
        _element: Element<'_, K, V>,
    ) -> Result<()> {
        Ok(())
    }

    fn notify_element_removed(
        &self,
        _cache: &Cache<K, V>,
        _element: Element<'_, K, V>,
    ) -> Result<()> {
        Ok(())
    }

    fn notify_element_expired(
        &self,
        _cache: &Cache<K, V>,
        _element: Element<'_, K, V>,
    ) -> Result<()> {
        Ok(())
    }

    fn notify_element_evicted(
        &self,
        _cache: &Cache<K, V>,
        _element: Element<'_, K, V>,
    ) -> Result<()> {
        Ok(())
    }

    fn notify_remove_all(&self, _cache: &Cache<K, V>) -> Result<()> {
        Ok(())
    }

    /// Called once while the owning cache is disposing. The cache must not
    /// be used from here.
    fn dispose(&self) {}

    /// Produce an independent copy of this listener.
    fn clone_listener(&self) -> Result<Box<dyn CacheEventListener<K, V>>> {
        Err(CacheError::NotCloneable {
            kind: "listener",
            name: self.name().to_string(),
        })
    }
}
