//! Error types for config store operations.

use crate::path::KeyPath;
use crate::watch::WatcherId;
use serde_json::Value;
use thiserror::Error;

/// Boxed error returned by a failing watcher callback.
pub type WatchError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while reading or changing a config tree.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No node exists at the path.
    #[error("key not found: '{0}'")]
    KeyNotFound(KeyPath),

    /// A leaf was traversed as if it were a map, or a map and a leaf
    /// collided while expanding keys.
    #[error("node at '{0}' is not a map")]
    TypeMismatch(KeyPath),

    /// A schema cast rejected an incoming value.
    #[error("{value} at '{path}' cannot be converted to {target}: {reason}")]
    Cast {
        path: KeyPath,
        value: Value,
        target: &'static str,
        reason: String,
    },

    /// `update`/`replace` input was not a mapping.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The operation needs at least one key segment.
    #[error("empty key")]
    EmptyKey,

    /// The watcher id is not registered at the path.
    #[error("watcher {id} not registered for '{path}'")]
    WatcherNotRegistered { path: KeyPath, id: WatcherId },

    /// A watcher callback failed; the triggering call was aborted.
    #[error("watcher at '{path}' failed: {source}")]
    Watcher {
        path: KeyPath,
        #[source]
        source: WatchError,
    },

    /// A stored value did not match the requested type.
    #[error("failed to deserialize '{path}': {source}")]
    Deserialize {
        path: KeyPath,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
