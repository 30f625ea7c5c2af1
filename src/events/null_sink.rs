//! Listener that does nothing but trace.

use tracing::trace;

use crate::cache::{Cache, CacheKey, CacheValue};
use crate::error::Result;

use super::{CacheEventListener, Element};

/// Default listener installed on every cache.
///
/// Every notification is a trace-level log line and nothing else. Cloning
/// always succeeds.
#[derive(Debug, Clone, Default)]
pub struct NullEventSink;

impl NullEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl<K: CacheKey, V: CacheValue> CacheEventListener<K, V> for NullEventSink {
    fn name(&self) -> &str {
        "null"
    }

    fn notify_element_put(&self, cache: &Cache<K, V>, _element: Element<'_, K, V>) -> Result<()> {
        trace!("{}: element put", cache.name());
        Ok(())
    }

    fn notify_element_updated(
        &self,
        cache: &Cache<K, V>,
        _element: Element<'_, K, V>,
    ) -> Result<()> {
        trace!("{}: element updated", cache.name());
        Ok(())
    }

    fn notify_element_removed(
        &self,
        cache: &Cache<K, V>,
        _element: Element<'_, K, V>,
    ) -> Result<()> {
        trace!("{}: element removed", cache.name());
        Ok(())
    }

    fn notify_element_expired(
        &self,
        cache: &Cache<K, V>,
        _element: Element<'_, K, V>,
    ) -> Result<()> {
        trace!("{}: element expired", cache.name());
        Ok(())
    }

    fn notify_element_evicted(
        &self,
        cache: &Cache<K, V>,
        _element: Element<'_, K, V>,
    ) -> Result<()> {
        trace!("{}: element evicted", cache.name());
        Ok(())
    }

    fn notify_remove_all(&self, cache: &Cache<K, V>) -> Result<()> {
        trace!("{}: all elements removed", cache.name());
        Ok(())
    }

    fn dispose(&self) {
        trace!("null event sink disposed");
    }

    fn clone_listener(&self) -> Result<Box<dyn CacheEventListener<K, V>>> {
        Ok(Box::new(NullEventSink))
    }
}
