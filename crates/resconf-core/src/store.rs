//! Config store.
//!
//! The store holds the default and current config trees, the schema of
//! casts and the watcher registry. `update` and `replace` diff an incoming
//! [`Patch`] against the current tree, commit each changed leaf and fire the
//! watchers of every changed path, deepest paths first.

use crate::error::{ConfigError, ConfigResult};
use crate::map::{NestedMap, Node};
use crate::merge::expand;
use crate::patch::{Change, Patch};
use crate::path::KeyPath;
use crate::schema::{Cast, Schema};
use crate::watch::{Action, Callback, Outcome, WatchResult, WatcherId, WatcherRegistry};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, trace};

/// Hierarchical config store with change watchers.
#[derive(Debug)]
pub struct ConfigStore {
    default: NestedMap,
    current: NestedMap,
    schema: Schema,
    watchers: WatcherRegistry,
}

impl ConfigStore {
    /// Create a store from `default` and load it as the current config.
    pub fn new(default: NestedMap) -> ConfigResult<Self> {
        Self::builder().defaults(default).build()
    }

    /// Create a store from a JSON object whose keys may be dotted paths.
    pub fn from_value(default: Value) -> ConfigResult<Self> {
        Self::new(expand(default)?)
    }

    pub fn builder() -> ConfigStoreBuilder {
        ConfigStoreBuilder::new()
    }

    /// Copy of the node at `path`. The root path returns the whole tree.
    pub fn get(&self, path: impl Into<KeyPath>) -> ConfigResult<Node> {
        let path = path.into();
        if path.is_root() {
            return Ok(Node::Map(self.current.clone()));
        }
        self.current.get(path).cloned()
    }

    /// Like [`get`](Self::get), falling back to `fallback` when the key is missing.
    pub fn get_or(&self, path: impl Into<KeyPath>, fallback: impl Into<Node>) -> Node {
        self.get(path).unwrap_or_else(|_| fallback.into())
    }

    /// The node at `path` as plain JSON.
    pub fn get_value(&self, path: impl Into<KeyPath>) -> ConfigResult<Value> {
        self.get(path).map(Node::into_value)
    }

    /// Deserialize the node at `path` into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, path: impl Into<KeyPath>) -> ConfigResult<T> {
        let path = path.into();
        let value = self.get_value(&path)?;
        serde_json::from_value(value).map_err(|source| ConfigError::Deserialize { path, source })
    }

    pub fn contains(&self, path: impl Into<KeyPath>) -> bool {
        self.current.contains(path)
    }

    /// Borrow the current tree.
    pub fn as_map(&self) -> &NestedMap {
        &self.current
    }

    pub fn to_value(&self) -> Value {
        self.current.to_value()
    }

    /// The tree `reset` restores.
    pub fn default_config(&self) -> &NestedMap {
        &self.default
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Cast future values written to `path` through `cast`. Values already
    /// stored are left as they are.
    pub fn register_cast(&mut self, path: impl Into<KeyPath>, cast: impl Cast + 'static) {
        self.schema.register(path, cast);
    }

    /// Register a fallible watcher at exactly `path`.
    pub fn register<F>(&mut self, path: impl Into<KeyPath>, callback: F) -> ConfigResult<WatcherId>
    where
        F: FnMut(Action, &Outcome, &Outcome) -> WatchResult + Send + 'static,
    {
        self.watchers.register(path, Box::new(callback))
    }

    /// Register a watcher that cannot fail.
    pub fn watch<F>(&mut self, path: impl Into<KeyPath>, mut callback: F) -> ConfigResult<WatcherId>
    where
        F: FnMut(Action, &Outcome, &Outcome) + Send + 'static,
    {
        self.register(path, move |action, old, new| {
            callback(action, old, new);
            Ok(())
        })
    }

    /// Remove the watcher `id` at `path`, or every watcher there if `id` is `None`.
    pub fn deregister(&mut self, path: impl Into<KeyPath>, id: Option<WatcherId>) -> ConfigResult<()> {
        self.watchers.deregister(path, id)
    }

    /// Ids of the watchers registered at exactly `path`.
    pub fn watchers(&self, path: impl Into<KeyPath>) -> Vec<WatcherId> {
        self.watchers.ids(&path.into())
    }

    /// Merge `patch` into the current tree. Keys absent from the patch are
    /// kept; `Change::Remove` leaves delete their key.
    pub fn update(&mut self, patch: impl Into<Patch>) -> ConfigResult<()> {
        self.apply(patch.into(), Mode::Update)
    }

    /// Make the current tree equal to `patch`. Keys absent from the patch,
    /// at any depth it reaches, are removed.
    pub fn replace(&mut self, patch: impl Into<Patch>) -> ConfigResult<()> {
        self.apply(patch.into(), Mode::Replace)
    }

    /// [`update`](Self::update) with a JSON object whose keys may be dotted paths.
    pub fn update_value(&mut self, value: Value) -> ConfigResult<()> {
        self.update(Patch::from_value(value)?)
    }

    /// [`replace`](Self::replace) with a JSON object whose keys may be dotted paths.
    pub fn replace_value(&mut self, value: Value) -> ConfigResult<()> {
        self.replace(Patch::from_value(value)?)
    }

    /// Replace the current tree with the defaults.
    pub fn reset(&mut self) -> ConfigResult<()> {
        let default = self.default.clone();
        self.replace(default)
    }

    /// Fire `Reloaded` at every watched path that holds a value, deepest
    /// paths first. The tree is not changed.
    pub fn reload(&mut self) -> ConfigResult<()> {
        debug!("reloading watchers");
        reload_map(&mut self.watchers, &KeyPath::root(), &self.current)
    }

    fn apply(&mut self, patch: Patch, mode: Mode) -> ConfigResult<()> {
        debug!(?mode, keys = patch.tree().len(), "applying config changes");
        let mut diff = Diff {
            schema: &self.schema,
            watchers: &mut self.watchers,
            replace: mode == Mode::Replace,
            changes: 0,
        };
        let result = diff.apply_map(&KeyPath::root(), &mut self.current, patch.into_tree());
        debug!(?mode, changes = diff.changes, ok = result.is_ok(), "config changes applied");
        result.map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Update,
    Replace,
}

/// One `update`/`replace` pass over the current tree.
///
/// Each changed leaf is committed before its watchers run, so a failing
/// cast or watcher leaves earlier changes in place.
struct Diff<'a> {
    schema: &'a Schema,
    watchers: &'a mut WatcherRegistry,
    replace: bool,
    changes: usize,
}

impl Diff<'_> {
    /// Apply `incoming` to the map at `path`. Returns whether anything changed.
    fn apply_map(&mut self, path: &KeyPath, current: &mut NestedMap, incoming: NestedMap<Change>) -> ConfigResult<bool> {
        let seen: HashSet<String> = if self.replace {
            incoming.keys().cloned().collect()
        } else {
            HashSet::new()
        };

        let mut changed = false;
        for (key, node) in incoming {
            let child = path.child(&key);
            changed |= match node {
                Node::Leaf(change) => self.apply_leaf(&child, current, key, change)?,
                Node::Map(sub) => self.apply_node(&child, current, key, sub)?,
            };
        }

        if self.replace {
            let stale: Vec<String> = current.keys().filter(|key| !seen.contains(*key)).cloned().collect();
            for key in stale {
                if let Some(old) = current.get_entry(&key) {
                    self.notify_removed(&path.child(&key), old)?;
                }
                current.remove_entry(&key);
                changed = true;
            }
        }
        Ok(changed)
    }

    fn apply_leaf(&mut self, path: &KeyPath, current: &mut NestedMap, key: String, change: Change) -> ConfigResult<bool> {
        let value = match change {
            Change::Remove => {
                let Some(old) = current.remove_entry(&key) else {
                    return Ok(false);
                };
                self.notify_removed(path, &old)?;
                return Ok(true);
            }
            Change::Set(value) => self.schema.apply(path, value)?,
        };

        // An object value is diffed like a nested patch.
        let new = match Node::from_value(value) {
            Node::Map(map) => return self.apply_node(path, current, key, map.map_leaves(Change::Set)),
            leaf => leaf,
        };
        let replaced_map = match current.get_entry(&key) {
            Some(old) if *old == new => return Ok(false),
            Some(Node::Map(_)) => true,
            _ => false,
        };

        let old = current.insert(key.clone(), new);
        if let (true, Some(Node::Map(old_map))) = (replaced_map, &old) {
            for (child_key, child) in old_map {
                self.notify_removed(&path.child(child_key), child)?;
            }
        }

        let new = current.get_entry(&key);
        let (action, old) = match old {
            None => (Action::Added, Outcome::Missing),
            Some(old) => (Action::Modified, Outcome::Value(old)),
        };
        self.emit(path, action, || old, || new.cloned().map_or(Outcome::Missing, Outcome::Value))?;
        Ok(true)
    }

    fn apply_node(
        &mut self,
        path: &KeyPath,
        current: &mut NestedMap,
        key: String,
        incoming: NestedMap<Change>,
    ) -> ConfigResult<bool> {
        let prior = current.get_entry(&key);
        let existed = prior.is_some();
        let was_map = matches!(prior, Some(Node::Map(_)));
        let snapshot = match prior {
            Some(node) if self.watchers.exists(path) => Some(node.clone()),
            _ => None,
        };

        let mut changed = false;
        if !was_map {
            if !writes_anything(&incoming) {
                return Ok(false);
            }
            current.insert(key.clone(), NestedMap::new());
            changed = true;
        }
        let Some(Node::Map(target)) = current.get_entry_mut(&key) else {
            return Err(ConfigError::TypeMismatch(path.clone()));
        };
        changed |= self.apply_map(path, target, incoming)?;
        if !changed {
            return Ok(false);
        }

        let action = if existed { Action::Modified } else { Action::Added };
        let old = snapshot.map_or(Outcome::Missing, Outcome::Value);
        let new = current.get_entry(&key);
        self.emit(path, action, || old, || new.cloned().map_or(Outcome::Missing, Outcome::Value))?;
        Ok(true)
    }

    /// Announce the removal of `node` at `path`: descendants first, then the
    /// node itself.
    fn notify_removed(&mut self, path: &KeyPath, node: &Node) -> ConfigResult<()> {
        if !self.watchers.covers(path) {
            self.changes += 1;
            return Ok(());
        }
        if let Node::Map(map) = node {
            for (key, child) in map {
                self.notify_removed(&path.child(key), child)?;
            }
        }
        self.emit(path, Action::Removed, || Outcome::Value(node.clone()), || Outcome::Remove)
    }

    /// Count a change at `path` and run its watchers. Outcomes are only
    /// built when someone is listening.
    fn emit(
        &mut self,
        path: &KeyPath,
        action: Action,
        old: impl FnOnce() -> Outcome,
        new: impl FnOnce() -> Outcome,
    ) -> ConfigResult<()> {
        self.changes += 1;
        if !self.watchers.exists(path) {
            return Ok(());
        }
        trace!(path = %path, ?action, "config changed");
        self.watchers.trigger(path, action, &old(), &new())
    }
}

/// False when `tree` holds nothing but removals, which are no-ops below a
/// key that is not a map. An empty tree still creates an empty map.
fn writes_anything(tree: &NestedMap<Change>) -> bool {
    tree.is_empty()
        || tree.iter().any(|(_, node)| match node {
            Node::Leaf(Change::Set(_)) => true,
            Node::Leaf(Change::Remove) => false,
            Node::Map(sub) => writes_anything(sub),
        })
}

fn reload_map(watchers: &mut WatcherRegistry, path: &KeyPath, map: &NestedMap) -> ConfigResult<()> {
    for (key, node) in map {
        let child = path.child(key);
        if !watchers.covers(&child) {
            continue;
        }
        if let Node::Map(sub) = node {
            reload_map(watchers, &child, sub)?;
        }
        if watchers.exists(&child) {
            let value = Outcome::Value(node.clone());
            watchers.trigger(&child, Action::Reloaded, &value, &value)?;
        }
    }
    Ok(())
}

/// Builder for [`ConfigStore`].
pub struct ConfigStoreBuilder {
    default: NestedMap,
    schema: Schema,
    watchers: Vec<(KeyPath, Callback)>,
    load_on_init: bool,
}

impl ConfigStoreBuilder {
    pub fn new() -> Self {
        Self {
            default: NestedMap::new(),
            schema: Schema::new(),
            watchers: Vec::new(),
            load_on_init: true,
        }
    }

    /// Default config, also loaded as the current config unless
    /// [`load_on_init`](Self::load_on_init) is turned off.
    pub fn defaults(mut self, default: NestedMap) -> Self {
        self.default = default;
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn cast(mut self, path: impl Into<KeyPath>, cast: impl Cast + 'static) -> Self {
        self.schema.register(path, cast);
        self
    }

    /// Register a fallible watcher. Registered watchers see the initial load.
    pub fn register<F>(mut self, path: impl Into<KeyPath>, callback: F) -> Self
    where
        F: FnMut(Action, &Outcome, &Outcome) -> WatchResult + Send + 'static,
    {
        self.watchers.push((path.into(), Box::new(callback)));
        self
    }

    pub fn watch<F>(self, path: impl Into<KeyPath>, mut callback: F) -> Self
    where
        F: FnMut(Action, &Outcome, &Outcome) + Send + 'static,
    {
        self.register(path, move |action, old, new| {
            callback(action, old, new);
            Ok(())
        })
    }

    /// Whether `build` loads the defaults into the current config. When off,
    /// the store starts empty until [`ConfigStore::reset`] is called.
    pub fn load_on_init(mut self, load: bool) -> Self {
        self.load_on_init = load;
        self
    }

    pub fn build(self) -> ConfigResult<ConfigStore> {
        let mut store = ConfigStore {
            default: self.default,
            current: NestedMap::new(),
            schema: self.schema,
            watchers: WatcherRegistry::new(),
        };
        for (path, callback) in self.watchers {
            store.watchers.register(path, callback)?;
        }
        if self.load_on_init {
            store.reset()?;
        }
        Ok(store)
    }
}

impl Default for ConfigStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
