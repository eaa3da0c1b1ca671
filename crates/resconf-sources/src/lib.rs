//! # resconf-sources
//!
//! External config sources for `resconf-core` stores.
//!
//! This crate provides:
//! - INI, JSON, TOML and YAML codecs selected by file extension
//! - Single and multi-file reading, with optional deep merge
//! - Environment variable overrides derived from the default keys
//! - Command-line overrides through `clap`
//! - A [`Loader`] that layers all of the above onto the defaults

pub mod args;
pub mod codec;
pub mod env;
pub mod error;
pub mod files;
pub mod loader;

pub use args::ArgMap;
pub use codec::Format;
pub use error::{SourceError, SourceResult};
pub use files::{load_file, read_files, save_file, StoreFileExt};
pub use loader::Loader;
