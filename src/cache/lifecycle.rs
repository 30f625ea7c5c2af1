//! Cache lifecycle state machine.

use std::fmt;

use parking_lot::RwLock;

use crate::error::{CacheError, Result};

/// Where a cache is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Built and configured, loader not yet initialised.
    Uninitialized,
    /// Serving operations.
    Alive,
    /// Teardown in progress; loaders and listeners are being disposed.
    Disposing,
    /// Storage released.
    Disposed,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Alive => "alive",
            Self::Disposing => "disposing",
            Self::Disposed => "disposed",
        };
        f.write_str(s)
    }
}

/// Guarded status with checked transitions.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    cache: String,
    status: RwLock<CacheStatus>,
}

impl Lifecycle {
    pub(crate) fn new(cache: &str) -> Self {
        Self {
            cache: cache.to_string(),
            status: RwLock::new(CacheStatus::Uninitialized),
        }
    }

    pub(crate) fn status(&self) -> CacheStatus {
        *self.status.read()
    }

    /// Move `from -> to`, failing if the current status is not `from`.
    pub(crate) fn transition(&self, from: CacheStatus, to: CacheStatus) -> Result<()> {
        let mut status = self.status.write();
        if *status != from {
            return Err(CacheError::illegal_state(
                &self.cache,
                format!("cannot move to {to} while {}", *status),
            ));
        }
        *status = to;
        Ok(())
    }

    /// Reject operations unless the cache is usable.
    ///
    /// `Uninitialized` is allowed so that configuration-time setup (and a
    /// loader's `init`) can touch the cache before it is published.
    pub(crate) fn check_operable(&self, operation: &str) -> Result<()> {
        match self.status() {
            CacheStatus::Uninitialized | CacheStatus::Alive => Ok(()),
            other => Err(CacheError::illegal_state(
                &self.cache,
                format!("`{operation}` not permitted while {other}"),
            )),
        }
    }
}
