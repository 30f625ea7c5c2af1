//! Failure isolation at the cache boundary.
//!
//! Every storage call, loader invocation and listener notification a
//! [`Cache`](crate::cache::Cache) makes runs through an [`IsolationWrapper`].
//! Recoverable failures (see [`CacheError::is_recoverable`]) go to the
//! cache's [`CacheExceptionHandler`] and the operation carries on as a miss.
//! Everything else returns to the caller untouched, and panics are never
//! caught.

mod recording;

pub use recording::{FailureRecorder, HandledFailure, RecordingExceptionHandler, RecordingHandlerFactory};

use std::sync::Arc;

use tracing::warn;

use crate::cache::CacheSettings;
use crate::error::{CacheError, Result};
use crate::source::Properties;

/// Receives failures the wrapper intercepted.
pub trait CacheExceptionHandler<K>: Send + Sync {
    fn on_failure(&self, cache: &CacheSettings, key: Option<&K>, failure: &CacheError);
}

/// Builds a handler for one cache from its declared properties.
pub trait ExceptionHandlerFactory<K>: Send + Sync {
    fn create_handler(&self, properties: &Properties) -> Result<Arc<dyn CacheExceptionHandler<K>>>;
}

/// Handler used when a cache declares none: logs and moves on.
#[derive(Debug, Clone, Default)]
pub struct LoggingExceptionHandler;

impl<K> CacheExceptionHandler<K> for LoggingExceptionHandler
where
    K: std::fmt::Debug,
{
    fn on_failure(&self, cache: &CacheSettings, key: Option<&K>, failure: &CacheError) {
        match key {
            Some(key) => warn!("Cache '{}' failed for key {:?}: {}", cache.name(), key, failure),
            None => warn!("Cache '{}' failed: {}", cache.name(), failure),
        }
    }
}

/// Runs operations for one cache and diverts recoverable failures.
pub struct IsolationWrapper<K> {
    settings: Arc<CacheSettings>,
    handler: Arc<dyn CacheExceptionHandler<K>>,
}

impl<K> Clone for IsolationWrapper<K> {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<K> IsolationWrapper<K> {
    pub fn new(settings: Arc<CacheSettings>, handler: Arc<dyn CacheExceptionHandler<K>>) -> Self {
        Self { settings, handler }
    }

    /// Run `op`.
    ///
    /// Returns `Ok(Some(value))` on success and `Ok(None)` when a recoverable
    /// failure was handed to the handler. Other errors come back as `Err`.
    pub fn run<T, F>(&self, key: Option<&K>, op: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        match op() {
            Ok(value) => Ok(Some(value)),
            Err(failure) if failure.is_recoverable() => {
                self.report(key, &failure);
                Ok(None)
            }
            Err(failure) => Err(failure),
        }
    }

    /// Hand an already-caught failure to the handler.
    pub fn report(&self, key: Option<&K>, failure: &CacheError) {
        self.handler.on_failure(&self.settings, key, failure);
    }
}
