//! Failure recording for tests and diagnostics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::cache::CacheSettings;
use crate::error::{CacheError, Result};
use crate::source::Properties;

use super::{CacheExceptionHandler, ExceptionHandlerFactory};

/// One intercepted failure.
#[derive(Debug, Clone)]
pub struct HandledFailure<K> {
    /// Name of the cache the failure happened in.
    pub cache: String,
    /// Owning manager, `None` for the default manager.
    pub manager: Option<String>,
    pub key: Option<K>,
    pub failure: CacheError,
    pub recorded_at: DateTime<Utc>,
}

/// Ordered, resettable log of handled failures.
///
/// Clones share the same log. Create one per test to keep runs isolated.
pub struct FailureRecorder<K> {
    entries: Arc<Mutex<Vec<HandledFailure<K>>>>,
}

impl<K> Clone for FailureRecorder<K> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K> Default for FailureRecorder<K> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<K: Clone> FailureRecorder<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, cache: &CacheSettings, key: Option<&K>, failure: &CacheError) {
        let entry = HandledFailure {
            cache: cache.name().to_string(),
            manager: cache.manager().map(str::to_string),
            key: key.cloned(),
            failure: failure.clone(),
            recorded_at: Utc::now(),
        };
        self.entries.lock().push(entry);
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn failures(&self) -> Vec<HandledFailure<K>> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forget everything recorded so far.
    pub fn reset_counters(&self) {
        self.entries.lock().clear();
    }
}

/// Handler that appends every failure to a [`FailureRecorder`].
pub struct RecordingExceptionHandler<K> {
    recorder: FailureRecorder<K>,
}

impl<K: Clone> RecordingExceptionHandler<K> {
    pub fn new(recorder: FailureRecorder<K>) -> Self {
        Self { recorder }
    }
}

impl<K> CacheExceptionHandler<K> for RecordingExceptionHandler<K>
where
    K: Clone + Send + Sync,
{
    fn on_failure(&self, cache: &CacheSettings, key: Option<&K>, failure: &CacheError) {
        self.recorder.record(cache, key, failure);
    }
}

/// Factory handing out handlers that all feed one recorder.
pub struct RecordingHandlerFactory<K> {
    recorder: FailureRecorder<K>,
}

impl<K: Clone> RecordingHandlerFactory<K> {
    pub fn new(recorder: FailureRecorder<K>) -> Self {
        Self { recorder }
    }
}

impl<K> ExceptionHandlerFactory<K> for RecordingHandlerFactory<K>
where
    K: Clone + Send + Sync + 'static,
{
    fn create_handler(&self, _properties: &Properties) -> Result<Arc<dyn CacheExceptionHandler<K>>> {
        Ok(Arc::new(RecordingExceptionHandler::new(self.recorder.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order_and_resets() {
        let recorder: FailureRecorder<String> = FailureRecorder::new();
        let settings = CacheSettings::named("orders");

        for key in ["a", "b", "c"] {
            recorder.record(&settings, Some(&key.to_string()), &CacheError::loader("l", key));
        }

        let keys: Vec<_> = recorder
            .failures()
            .into_iter()
            .map(|f| f.key.unwrap())
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);

        recorder.reset_counters();
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_factory_handlers_share_recorder() {
        let recorder: FailureRecorder<u32> = FailureRecorder::new();
        let factory = RecordingHandlerFactory::new(recorder.clone());
        let first = factory.create_handler(&Properties::new()).unwrap();
        let second = factory.create_handler(&Properties::new()).unwrap();

        let settings = CacheSettings::named("shared");
        first.on_failure(&settings, Some(&1), &CacheError::Storage("x".into()));
        second.on_failure(&settings, None, &CacheError::Storage("y".into()));

        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.failures()[1].key, None);
    }

    #[test]
    fn test_separate_recorders_are_isolated() {
        let one: FailureRecorder<u32> = FailureRecorder::new();
        let two: FailureRecorder<u32> = FailureRecorder::new();
        one.record(&CacheSettings::named("c"), None, &CacheError::Storage("x".into()));
        assert_eq!(one.len(), 1);
        assert!(two.is_empty());
    }
}
