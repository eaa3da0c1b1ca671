//! # resconf-core
//!
//! Hierarchical configuration store with change watchers.
//!
//! This crate provides:
//! - Key paths with escaped dots (`a.b\.c`)
//! - Ordered nested maps, deep merge and dotted-key expansion
//! - Schema casts applied to incoming values
//! - A config store that diffs updates and notifies watchers per path
//!
//! File formats, environment variables and command-line arguments live in
//! `resconf-sources`. This crate contains no I/O.

pub mod error;
pub mod map;
pub mod merge;
pub mod patch;
pub mod path;
pub mod schema;
pub mod store;
pub mod watch;

pub use error::{ConfigError, ConfigResult, WatchError};
pub use map::{NestedMap, Node};
pub use merge::{expand, expand_entries, merge};
pub use patch::{Change, Patch};
pub use path::KeyPath;
pub use schema::{Cast, Schema};
pub use serde_json::Value;
pub use store::{ConfigStore, ConfigStoreBuilder};
pub use watch::{Action, Outcome, WatchResult, WatcherId, WatcherRegistry};
