//! Configuration sources and the named-over-base merge.
//!
//! A source maps cache names to [`RawCacheConfig`] records. Every field of a
//! record is optional so that a named source can say "inherit" simply by
//! leaving a field out.
//!
//! ## Document format
//!
//! ```json
//! {
//!   "caches": {
//!     "sampleCache": {
//!       "expiry": { "ACCESSED": { "unit": "SECONDS", "amount": 360 } },
//!       "copy_on_read": true,
//!       "copy_on_write": true
//!     }
//!   },
//!   "managers": {
//!     "reporting": { "caches": { "sampleCache": { "overflow_to_disk": true } } }
//!   }
//! }
//! ```

mod properties;

pub use properties::Properties;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::cache::{ExpiryDuration, ExpiryType};
use crate::error::{CacheError, Result};

/// Declarative loader attachment: which factory, with what settings.
///
/// When `properties` is present the loader is built engine-natively for the
/// cache from the parsed property string; otherwise the factory receives
/// `environment`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoaderDecl {
    pub factory: String,
    #[serde(default)]
    pub properties: Option<String>,
    #[serde(default)]
    pub property_separator: Option<String>,
    #[serde(default)]
    pub environment: Map<String, Value>,
}

impl LoaderDecl {
    pub fn properties(&self) -> Result<Properties> {
        Properties::parse(
            self.properties.as_deref().unwrap_or_default(),
            self.property_separator.as_deref(),
        )
    }
}

/// Declarative exception handler attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerDecl {
    pub factory: String,
    #[serde(default)]
    pub properties: Option<String>,
    #[serde(default)]
    pub property_separator: Option<String>,
}

impl HandlerDecl {
    pub fn properties(&self) -> Result<Properties> {
        Properties::parse(
            self.properties.as_deref().unwrap_or_default(),
            self.property_separator.as_deref(),
        )
    }
}

/// One cache as a single source declares it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCacheConfig {
    #[serde(default)]
    pub expiry: BTreeMap<ExpiryType, ExpiryDuration>,
    #[serde(default)]
    pub copy_on_read: Option<bool>,
    #[serde(default)]
    pub copy_on_write: Option<bool>,
    #[serde(default)]
    pub overflow_to_disk: Option<bool>,
    #[serde(default)]
    pub max_entries: Option<u64>,
    #[serde(default)]
    pub loader: Option<LoaderDecl>,
    #[serde(default)]
    pub exception_handler: Option<HandlerDecl>,
}

impl RawCacheConfig {
    /// Lay `self` over `base`.
    ///
    /// Fields `self` declares win; the rest come from `base`. Expiry is merged
    /// per expiry type, and a declared duration replaces the base one whole.
    pub fn merged_over(&self, base: &RawCacheConfig) -> RawCacheConfig {
        let mut expiry = base.expiry.clone();
        expiry.extend(self.expiry.iter().map(|(k, v)| (*k, *v)));

        RawCacheConfig {
            expiry,
            copy_on_read: self.copy_on_read.or(base.copy_on_read),
            copy_on_write: self.copy_on_write.or(base.copy_on_write),
            overflow_to_disk: self.overflow_to_disk.or(base.overflow_to_disk),
            max_entries: self.max_entries.or(base.max_entries),
            loader: self.loader.clone().or_else(|| base.loader.clone()),
            exception_handler: self
                .exception_handler
                .clone()
                .or_else(|| base.exception_handler.clone()),
        }
    }

    /// Set an expiry duration (builder pattern).
    #[must_use]
    pub fn expiry(mut self, expiry_type: ExpiryType, duration: ExpiryDuration) -> Self {
        self.expiry.insert(expiry_type, duration);
        self
    }

    #[must_use]
    pub fn copy_on_read(mut self, value: bool) -> Self {
        self.copy_on_read = Some(value);
        self
    }

    #[must_use]
    pub fn copy_on_write(mut self, value: bool) -> Self {
        self.copy_on_write = Some(value);
        self
    }

    #[must_use]
    pub fn overflow_to_disk(mut self, value: bool) -> Self {
        self.overflow_to_disk = Some(value);
        self
    }

    #[must_use]
    pub fn max_entries(mut self, value: u64) -> Self {
        self.max_entries = Some(value);
        self
    }

    #[must_use]
    pub fn loader(mut self, decl: LoaderDecl) -> Self {
        self.loader = Some(decl);
        self
    }

    #[must_use]
    pub fn exception_handler(mut self, decl: HandlerDecl) -> Self {
        self.exception_handler = Some(decl);
        self
    }
}

/// Somewhere cache declarations come from.
pub trait ConfigSource: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Read every cache declaration. Called when a manager is first resolved.
    fn load(&self) -> Result<BTreeMap<String, RawCacheConfig>>;
}

/// Merge `named` over `base`, cache by cache.
///
/// Caches only the named source declares are included as-is.
pub fn merge_sources(
    base: &dyn ConfigSource,
    named: Option<&dyn ConfigSource>,
) -> Result<BTreeMap<String, RawCacheConfig>> {
    let mut merged = base.load()?;

    let Some(named) = named else {
        return Ok(merged);
    };

    for (cache_name, overrides) in named.load()? {
        debug!(
            "Merging cache '{}' from source '{}' over '{}'",
            cache_name,
            named.name(),
            base.name()
        );
        let combined = match merged.get(&cache_name) {
            Some(base_config) => overrides.merged_over(base_config),
            None => overrides,
        };
        merged.insert(cache_name, combined);
    }

    Ok(merged)
}

/// In-memory source, mostly for programmatic setups and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    name: String,
    caches: BTreeMap<String, RawCacheConfig>,
}

impl StaticConfigSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            caches: BTreeMap::new(),
        }
    }

    /// Declare a cache (builder pattern).
    #[must_use]
    pub fn cache(mut self, name: impl Into<String>, config: RawCacheConfig) -> Self {
        self.caches.insert(name.into(), config);
        self
    }
}

impl ConfigSource for StaticConfigSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<BTreeMap<String, RawCacheConfig>> {
        Ok(self.caches.clone())
    }
}

#[derive(Debug, Clone)]
enum JsonOrigin {
    Text(String),
    File(PathBuf),
}

/// JSON source holding a `{"caches": {...}}` section.
///
/// The text is parsed on every [`ConfigSource::load`], so a malformed
/// document surfaces when the manager that needs it is resolved.
#[derive(Debug, Clone)]
pub struct JsonConfigSource {
    name: String,
    origin: JsonOrigin,
}

#[derive(Debug, Default, Deserialize)]
struct CachesSection {
    #[serde(default)]
    caches: BTreeMap<String, RawCacheConfig>,
}

impl JsonConfigSource {
    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: JsonOrigin::Text(text.into()),
        }
    }

    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            origin: JsonOrigin::File(path.into()),
        }
    }
}

impl ConfigSource for JsonConfigSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<BTreeMap<String, RawCacheConfig>> {
        let text = match &self.origin {
            JsonOrigin::Text(text) => text.clone(),
            JsonOrigin::File(path) => std::fs::read_to_string(path)
                .map_err(|e| CacheError::config(&self.name, format!("{}: {e}", path.display())))?,
        };

        let section: CachesSection =
            serde_json::from_str(&text).map_err(|e| CacheError::config(&self.name, e))?;
        Ok(section.caches)
    }
}

/// A whole configuration document: a base section plus named sections.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    caches: BTreeMap<String, RawCacheConfig>,
    #[serde(default)]
    managers: BTreeMap<String, CachesSection>,
}

impl ConfigDocument {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CacheError::config("document", e))
    }

    /// Split into the base source and one source per named manager.
    pub fn into_sources(self) -> (StaticConfigSource, Vec<(String, StaticConfigSource)>) {
        let base = StaticConfigSource {
            name: "default".to_string(),
            caches: self.caches,
        };
        let named = self
            .managers
            .into_iter()
            .map(|(name, section)| {
                let source = StaticConfigSource {
                    name: name.clone(),
                    caches: section.caches,
                };
                (name, source)
            })
            .collect();
        (base, named)
    }
}
