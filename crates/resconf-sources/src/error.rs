//! Errors raised while reading or writing config sources.

use resconf_core::{ConfigError, KeyPath};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading config from files, the environment
/// or command-line arguments.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading or writing a file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to write TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid INI: {0}")]
    Ini(#[from] ini::ParseError),

    /// INI holds sections of plain options, nothing deeper.
    #[error("INI cannot hold the nested map at '{0}'")]
    IniNesting(KeyPath),

    #[error("Failed to write INI: {0}")]
    IniWrite(#[source] std::io::Error),

    /// The file extension does not name a supported format.
    #[error("Unsupported config file format: '{0}'")]
    UnsupportedFormat(PathBuf),

    /// The loaded content could not be applied to the config tree.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;
