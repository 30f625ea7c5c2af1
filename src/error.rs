//! Error types shared by every layer of the crate.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = CacheError> = std::result::Result<T, E>;

/// Everything that can go wrong while resolving, attaching or operating caches.
///
/// Only loader, listener and storage failures are recoverable. Those are the
/// ones the isolation wrapper hands to an exception handler; everything else
/// is a configuration or lifecycle mistake and reaches the caller directly.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// A configuration source could not be read or parsed.
    #[error("configuration error in source `{source_name}`: {message}")]
    Config {
        source_name: String,
        message: String,
    },

    /// A cache declared a loader factory nobody registered.
    #[error("cache `{cache}` references unknown loader factory `{factory}`")]
    UnknownLoaderFactory { cache: String, factory: String },

    /// A cache declared an exception handler factory nobody registered.
    #[error("cache `{cache}` references unknown exception handler factory `{factory}`")]
    UnknownHandlerFactory { cache: String, factory: String },

    /// A loader or listener cannot produce independent instances.
    #[error("{kind} `{name}` cannot be cloned")]
    NotCloneable { kind: &'static str, name: String },

    /// An operation was attempted in a lifecycle state that forbids it.
    #[error("illegal state for cache `{cache}`: {message}")]
    IllegalState { cache: String, message: String },

    /// A loader failed to produce a value.
    #[error("loader `{loader}` failed: {message}")]
    Loader { loader: String, message: String },

    /// An event listener failed while handling a notification.
    #[error("listener `{listener}` failed: {message}")]
    Listener { listener: String, message: String },

    /// The storage engine rejected an operation.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl CacheError {
    /// Build a configuration error for the named source.
    pub fn config(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::Config {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Build a loader failure.
    pub fn loader(loader: impl Into<String>, message: impl ToString) -> Self {
        Self::Loader {
            loader: loader.into(),
            message: message.to_string(),
        }
    }

    /// Build a listener failure.
    pub fn listener(listener: impl Into<String>, message: impl ToString) -> Self {
        Self::Listener {
            listener: listener.into(),
            message: message.to_string(),
        }
    }

    pub fn illegal_state(cache: impl Into<String>, message: impl ToString) -> Self {
        Self::IllegalState {
            cache: cache.into(),
            message: message.to_string(),
        }
    }

    /// Whether the isolation wrapper may hand this failure to a handler
    /// instead of returning it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Loader { .. } | Self::Listener { .. } | Self::Storage(_)
        )
    }
}
