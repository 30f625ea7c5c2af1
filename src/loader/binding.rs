//! The zero-or-one loader attached to a cache, with its lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{Cache, CacheKey, CacheStatus, CacheValue};
use crate::error::{CacheError, Result};

use super::KeyedLoader;

/// Lifecycle of one attached loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Constructed,
    Initialized,
    Disposed,
}

impl LoaderState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Constructed,
            1 => Self::Initialized,
            _ => Self::Disposed,
        }
    }
}

/// A loader plus the state that enforces its lifecycle.
pub struct LoaderBinding<K: CacheKey, V: CacheValue> {
    loader: Arc<dyn KeyedLoader<K, V>>,
    state: AtomicU8,
    // Held for the whole of init/dispose so neither can run twice at once.
    // The state itself stays readable so the cache can be used from `init`.
    transition: Mutex<()>,
}

impl<K: CacheKey, V: CacheValue> LoaderBinding<K, V> {
    /// Bind a loader as-is. Nothing is cloned.
    pub fn new(loader: Arc<dyn KeyedLoader<K, V>>) -> Self {
        Self {
            loader,
            state: AtomicU8::new(LoaderState::Constructed as u8),
            transition: Mutex::new(()),
        }
    }

    pub fn loader(&self) -> &Arc<dyn KeyedLoader<K, V>> {
        &self.loader
    }

    pub fn name(&self) -> &str {
        self.loader.name()
    }

    pub fn state(&self) -> LoaderState {
        LoaderState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LoaderState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Whether loads may be dispatched.
    pub fn is_ready(&self) -> bool {
        self.state() == LoaderState::Initialized
    }

    /// Clone this loader into a fresh, unshared binding for `target`.
    ///
    /// Only legal while this loader is not yet initialised, or while the
    /// cache that owns it (`owner_status`) is not alive.
    pub fn clone_into(&self, owner_status: CacheStatus, target: &Cache<K, V>) -> Result<Self> {
        let state = self.state();
        if state != LoaderState::Constructed && owner_status == CacheStatus::Alive {
            return Err(CacheError::illegal_state(
                target.name(),
                format!("loader `{}` cannot be cloned once initialised", self.name()),
            ));
        }

        let copy = self.loader.clone_for(target)?;
        debug!("Cloned loader '{}' for cache '{}'", self.name(), target.name());
        Ok(Self::new(Arc::from(copy)))
    }

    /// Run the loader's `init`. A second call is a lifecycle error.
    pub fn init(&self, cache: &Cache<K, V>) -> Result<()> {
        let _guard = self.transition.lock();
        match self.state() {
            LoaderState::Constructed => {
                self.loader.init(cache)?;
                self.set_state(LoaderState::Initialized);
                debug!("Initialised loader '{}' for cache '{}'", self.name(), cache.name());
                Ok(())
            }
            LoaderState::Initialized => Err(CacheError::illegal_state(
                cache.name(),
                format!("loader `{}` initialised twice", self.name()),
            )),
            LoaderState::Disposed => Err(CacheError::illegal_state(
                cache.name(),
                format!("loader `{}` already disposed", self.name()),
            )),
        }
    }

    /// Run the loader's `dispose` unless it already ran.
    pub fn dispose(&self) {
        let _guard = self.transition.lock();
        if self.state() == LoaderState::Disposed {
            return;
        }
        self.loader.dispose();
        self.set_state(LoaderState::Disposed);
    }
}

impl<K: CacheKey, V: CacheValue> std::fmt::Debug for LoaderBinding<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderBinding")
            .field("loader", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
