//! cache-bridge - named cache managers with keyed loaders over Moka.
//!
//! ## Architecture
//!
//! - `cache` - registry, managers, caches and the storage engine seam
//! - `source` - configuration sources, merging and properties parsing
//! - `loader` - the keyed loader protocol and its lifecycle binding
//! - `isolation` - exception handlers and the wrapper that applies them
//! - `events` - cache event listeners and the no-op sink
//! - `error` - the crate error type

pub mod cache;
pub mod error;
pub mod events;
pub mod isolation;
pub mod loader;
pub mod source;

pub use cache::{Cache, CacheManager, CacheManagerRegistry, CacheSettings, ExpiryDuration, ExpiryType};
pub use error::{CacheError, Result};
