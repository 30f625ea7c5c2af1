//! Resolved cache settings.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::source::{HandlerDecl, LoaderDecl, RawCacheConfig};

use super::{ExpiryDuration, ExpiryType};

/// Capacity used when no source declares `max_entries`.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Fully resolved, immutable settings for one cache.
///
/// Built once when the owning manager's configuration is merged. A
/// different configuration means a different `CacheSettings`.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    name: Arc<str>,
    manager: Option<Arc<str>>,
    expiry: BTreeMap<ExpiryType, ExpiryDuration>,
    copy_on_read: bool,
    copy_on_write: bool,
    store_by_value: bool,
    overflow_to_disk: bool,
    max_entries: u64,
    loader: Option<LoaderDecl>,
    exception_handler: Option<HandlerDecl>,
}

impl CacheSettings {
    /// Resolve a merged raw record, filling in defaults.
    pub fn resolve(manager: Option<&str>, name: &str, raw: &RawCacheConfig) -> Self {
        let copy_on_read = raw.copy_on_read.unwrap_or(false);
        let copy_on_write = raw.copy_on_write.unwrap_or(false);

        Self {
            name: Arc::from(name),
            manager: manager.map(Arc::from),
            expiry: raw.expiry.clone(),
            copy_on_read,
            copy_on_write,
            store_by_value: copy_on_read && copy_on_write,
            overflow_to_disk: raw.overflow_to_disk.unwrap_or(false),
            max_entries: raw.max_entries.unwrap_or(DEFAULT_MAX_ENTRIES),
            loader: raw.loader.clone(),
            exception_handler: raw.exception_handler.clone(),
        }
    }

    /// Settings for a cache built in code rather than from a source.
    pub fn named(name: &str) -> Self {
        Self::resolve(None, name, &RawCacheConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning manager, `None` for the default manager.
    pub fn manager(&self) -> Option<&str> {
        self.manager.as_deref()
    }

    /// Configured duration for an expiry type, eternal when undeclared.
    pub fn expiry(&self, expiry_type: ExpiryType) -> ExpiryDuration {
        self.expiry
            .get(&expiry_type)
            .copied()
            .unwrap_or(ExpiryDuration::ETERNAL)
    }

    pub fn copy_on_read(&self) -> bool {
        self.copy_on_read
    }

    pub fn copy_on_write(&self) -> bool {
        self.copy_on_write
    }

    /// True only when values are copied both on the way in and out.
    pub fn store_by_value(&self) -> bool {
        self.store_by_value
    }

    pub fn overflow_to_disk(&self) -> bool {
        self.overflow_to_disk
    }

    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    pub fn loader(&self) -> Option<&LoaderDecl> {
        self.loader.as_ref()
    }

    pub fn exception_handler(&self) -> Option<&HandlerDecl> {
        self.exception_handler.as_ref()
    }
}
