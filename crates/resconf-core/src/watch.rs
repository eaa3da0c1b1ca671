//! Change watchers.
//!
//! Watchers are callbacks registered at an exact key path. The registry is
//! a tree mirroring config paths; triggering a path runs only the callbacks
//! registered there, never those of its ancestors or descendants.

use crate::error::{ConfigError, ConfigResult, WatchError};
use crate::map::Node;
use crate::path::KeyPath;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use tracing::trace;

/// What happened to the value at a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Added,
    Modified,
    Removed,
    /// Fired by `reload` with identical old and new values.
    Reloaded,
}

/// Old or new value passed to a watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The key did not exist.
    Missing,
    /// The key was deleted.
    Remove,
    Value(Node),
}

impl Outcome {
    pub fn value(&self) -> Option<&Node> {
        match self {
            Outcome::Value(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Outcome::Missing)
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, Outcome::Remove)
    }

    /// Shorthand for a value outcome built from JSON.
    pub fn json(value: Value) -> Self {
        Outcome::Value(Node::from_value(value))
    }
}

impl From<Node> for Outcome {
    fn from(node: Node) -> Self {
        Outcome::Value(node)
    }
}

/// Result returned by a watcher callback.
pub type WatchResult = Result<(), WatchError>;

/// A watcher callback: `(action, old, new)`.
pub type Callback = Box<dyn FnMut(Action, &Outcome, &Outcome) -> WatchResult + Send>;

/// Handle identifying one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Default)]
struct WatchNode {
    callbacks: Vec<(WatcherId, Callback)>,
    children: IndexMap<String, WatchNode>,
}

impl WatchNode {
    fn is_empty(&self) -> bool {
        self.callbacks.is_empty() && self.children.is_empty()
    }

    fn find(&self, path: &KeyPath) -> Option<&WatchNode> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.children.get(segment))
    }

    fn find_mut(&mut self, path: &KeyPath) -> Option<&mut WatchNode> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.children.get_mut(segment))
    }

    /// Drop empty nodes along `segments`, deepest first.
    fn prune(&mut self, segments: &[String]) {
        let Some((first, rest)) = segments.split_first() else {
            return;
        };
        if let Some(child) = self.children.get_mut(first) {
            child.prune(rest);
            if child.is_empty() {
                self.children.shift_remove(first);
            }
        }
    }
}

/// Tree of watcher callbacks keyed by exact path.
#[derive(Default)]
pub struct WatcherRegistry {
    root: WatchNode,
    next_id: u64,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to the list at `path`. Callbacks at one path fire
    /// in registration order.
    pub fn register(&mut self, path: impl Into<KeyPath>, callback: Callback) -> ConfigResult<WatcherId> {
        let path = path.into();
        if path.is_root() {
            return Err(ConfigError::EmptyKey);
        }
        let node = path
            .segments()
            .iter()
            .fold(&mut self.root, |node, segment| {
                node.children.entry(segment.clone()).or_default()
            });

        self.next_id += 1;
        let id = WatcherId(self.next_id);
        node.callbacks.push((id, callback));
        Ok(id)
    }

    /// Remove one callback, or all callbacks at `path` when `id` is `None`.
    ///
    /// Fails with `KeyNotFound` if nothing is registered at `path` and with
    /// `WatcherNotRegistered` if `id` is not among its callbacks.
    pub fn deregister(&mut self, path: impl Into<KeyPath>, id: Option<WatcherId>) -> ConfigResult<()> {
        let path = path.into();
        let node = match self.root.find_mut(&path) {
            Some(node) if !node.callbacks.is_empty() => node,
            _ => return Err(ConfigError::KeyNotFound(path)),
        };

        match id {
            None => node.callbacks.clear(),
            Some(id) => {
                let Some(pos) = node.callbacks.iter().position(|(cid, _)| *cid == id) else {
                    return Err(ConfigError::WatcherNotRegistered { path, id });
                };
                node.callbacks.remove(pos);
            }
        }

        if node.callbacks.is_empty() {
            self.root.prune(path.segments());
        }
        Ok(())
    }

    /// True if at least one callback is registered at exactly `path`.
    pub fn exists(&self, path: &KeyPath) -> bool {
        self.root
            .find(path)
            .map_or(false, |node| !node.callbacks.is_empty())
    }

    /// True if a callback is registered at `path` or anywhere below it.
    pub fn covers(&self, path: &KeyPath) -> bool {
        self.root.find(path).map_or(false, |node| !node.is_empty())
    }

    /// Ids of the callbacks at `path`, in registration order.
    pub fn ids(&self, path: &KeyPath) -> Vec<WatcherId> {
        self.root
            .find(path)
            .map(|node| node.callbacks.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default()
    }

    /// True when no callbacks are registered anywhere.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Run the callbacks registered at exactly `path`.
    ///
    /// The first failing callback aborts the remaining ones and its error is
    /// returned as `ConfigError::Watcher`.
    pub fn trigger(&mut self, path: &KeyPath, action: Action, old: &Outcome, new: &Outcome) -> ConfigResult<()> {
        let Some(node) = self.root.find_mut(path) else {
            return Ok(());
        };
        for (id, callback) in node.callbacks.iter_mut() {
            trace!(path = %path, watcher = %id, ?action, "triggering watcher");
            callback(action, old, new).map_err(|source| ConfigError::Watcher {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for WatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherRegistry")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}
