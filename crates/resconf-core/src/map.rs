//! Ordered nested maps addressed by key paths.
//!
//! A [`NestedMap`] holds either leaves or further maps under each key and
//! keeps insertion order, which is the enumeration order of [`NestedMap::allkeys`]
//! and the order in which watchers fire.

use crate::error::{ConfigError, ConfigResult};
use crate::path::KeyPath;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A node in a nested map: a leaf value or a nested map.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<V = Value> {
    Leaf(V),
    Map(NestedMap<V>),
}

impl<V> Node<V> {
    pub fn is_map(&self) -> bool {
        matches!(self, Node::Map(_))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn as_leaf(&self) -> Option<&V> {
        match self {
            Node::Leaf(v) => Some(v),
            Node::Map(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&NestedMap<V>> {
        match self {
            Node::Map(m) => Some(m),
            Node::Leaf(_) => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut NestedMap<V>> {
        match self {
            Node::Map(m) => Some(m),
            Node::Leaf(_) => None,
        }
    }

    /// Convert every leaf with `f`, keeping the tree shape.
    pub fn map_leaves<U>(self, f: &mut impl FnMut(V) -> U) -> Node<U> {
        match self {
            Node::Leaf(v) => Node::Leaf(f(v)),
            Node::Map(m) => Node::Map(m.map_leaves_with(f)),
        }
    }
}

impl Node<Value> {
    /// Convert a JSON value literally: objects become maps, keys are not split.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(obj) => Node::Map(
                obj.into_iter()
                    .map(|(k, v)| (k, Node::from_value(v)))
                    .collect(),
            ),
            other => Node::Leaf(other),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Node::Leaf(v) => v.clone(),
            Node::Map(m) => m.to_value(),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Node::Leaf(v) => v,
            Node::Map(m) => m.into_value(),
        }
    }
}

impl From<Value> for Node<Value> {
    fn from(value: Value) -> Self {
        Node::from_value(value)
    }
}

impl<V> From<NestedMap<V>> for Node<V> {
    fn from(map: NestedMap<V>) -> Self {
        Node::Map(map)
    }
}

impl PartialEq<Value> for Node<Value> {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Node::Leaf(v), other) => v == other,
            (Node::Map(m), Value::Object(_)) => m.to_value() == *other,
            _ => false,
        }
    }
}

/// An insertion-ordered, string-keyed tree of [`Node`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedMap<V = Value> {
    entries: IndexMap<String, Node<V>>,
}

impl<V> Default for NestedMap<V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<V> NestedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Node<V>> {
        self.entries.iter()
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, String, Node<V>> {
        self.entries.keys()
    }

    /// Direct child lookup; `key` is a single segment.
    pub fn get_entry(&self, key: &str) -> Option<&Node<V>> {
        self.entries.get(key)
    }

    pub fn get_entry_mut(&mut self, key: &str) -> Option<&mut Node<V>> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a direct child. An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, node: impl Into<Node<V>>) -> Option<Node<V>> {
        self.entries.insert(key.into(), node.into())
    }

    /// Remove a direct child, preserving the order of the rest.
    pub fn remove_entry(&mut self, key: &str) -> Option<Node<V>> {
        self.entries.shift_remove(key)
    }

    /// Get the node at `path`.
    ///
    /// Fails with `KeyNotFound` when a segment is absent and `TypeMismatch`
    /// when an intermediate segment is a leaf.
    pub fn get(&self, path: impl Into<KeyPath>) -> ConfigResult<&Node<V>> {
        let path = path.into();
        let (parent, last) = self.parent(&path)?;
        parent
            .entries
            .get(last)
            .ok_or_else(|| ConfigError::KeyNotFound(path.clone()))
    }

    pub fn get_mut(&mut self, path: impl Into<KeyPath>) -> ConfigResult<&mut Node<V>> {
        let path = path.into();
        let (parent, last) = self.parent_mut(&path, false)?;
        parent
            .entries
            .get_mut(last)
            .ok_or_else(|| ConfigError::KeyNotFound(path.clone()))
    }

    /// Set the node at `path`, returning the previous node.
    ///
    /// With `create`, missing intermediate maps are synthesized. A leaf in
    /// the middle of the path is never overwritten.
    pub fn set(
        &mut self,
        path: impl Into<KeyPath>,
        node: impl Into<Node<V>>,
        create: bool,
    ) -> ConfigResult<Option<Node<V>>> {
        let path = path.into();
        let (parent, last) = self.parent_mut(&path, create)?;
        Ok(parent.entries.insert(last.to_string(), node.into()))
    }

    /// Check if a node exists at `path`. Never fails.
    pub fn contains(&self, path: impl Into<KeyPath>) -> bool {
        self.get(path).is_ok()
    }

    /// Remove and return the node at `path`.
    pub fn remove(&mut self, path: impl Into<KeyPath>) -> ConfigResult<Node<V>> {
        let path = path.into();
        let (parent, last) = self.parent_mut(&path, false)?;
        parent
            .entries
            .shift_remove(last)
            .ok_or_else(|| ConfigError::KeyNotFound(path.clone()))
    }

    /// Lazily enumerate the full path of every leaf, depth-first in
    /// insertion order. Empty maps contribute no keys.
    pub fn allkeys(&self) -> AllKeys<'_, V> {
        AllKeys {
            stack: vec![(KeyPath::root(), self.entries.iter())],
        }
    }

    /// Convert every leaf with `f`.
    pub fn map_leaves<U>(self, mut f: impl FnMut(V) -> U) -> NestedMap<U> {
        self.map_leaves_with(&mut f)
    }

    fn map_leaves_with<U>(self, f: &mut impl FnMut(V) -> U) -> NestedMap<U> {
        NestedMap {
            entries: self
                .entries
                .into_iter()
                .map(|(k, node)| (k, node.map_leaves(f)))
                .collect(),
        }
    }

    /// Resolve the map holding the last segment of `path`.
    fn parent<'a, 'p>(&'a self, path: &'p KeyPath) -> ConfigResult<(&'a NestedMap<V>, &'p str)> {
        let (last, init) = path.segments().split_last().ok_or(ConfigError::EmptyKey)?;
        let mut map = self;
        for (idx, segment) in init.iter().enumerate() {
            map = match map.entries.get(segment) {
                Some(Node::Map(m)) => m,
                Some(Node::Leaf(_)) => return Err(ConfigError::TypeMismatch(path.prefix(idx + 1))),
                None => return Err(ConfigError::KeyNotFound(path.prefix(idx + 1))),
            };
        }
        Ok((map, last))
    }

    fn parent_mut<'a, 'p>(
        &'a mut self,
        path: &'p KeyPath,
        create: bool,
    ) -> ConfigResult<(&'a mut NestedMap<V>, &'p str)> {
        let (last, init) = path.segments().split_last().ok_or(ConfigError::EmptyKey)?;
        let mut map = self;
        for (idx, segment) in init.iter().enumerate() {
            if create && !map.entries.contains_key(segment) {
                map.entries
                    .insert(segment.clone(), Node::Map(NestedMap::new()));
            }
            map = match map.entries.get_mut(segment) {
                Some(Node::Map(m)) => m,
                Some(Node::Leaf(_)) => return Err(ConfigError::TypeMismatch(path.prefix(idx + 1))),
                None => return Err(ConfigError::KeyNotFound(path.prefix(idx + 1))),
            };
        }
        Ok((map, last))
    }
}

impl<V: Clone> NestedMap<V> {
    /// Map every leaf path to its node, depth-first in insertion order.
    ///
    /// Empty maps are kept as `Node::Map` entries, so
    /// [`expand_entries`](crate::merge::expand_entries) rebuilds the same tree.
    pub fn flatten(&self) -> IndexMap<KeyPath, Node<V>> {
        let mut out = IndexMap::new();
        flatten_into(self, &KeyPath::root(), &mut out);
        out
    }
}

fn flatten_into<V: Clone>(map: &NestedMap<V>, prefix: &KeyPath, out: &mut IndexMap<KeyPath, Node<V>>) {
    for (key, node) in map.iter() {
        let path = prefix.child(key);
        match node {
            Node::Map(m) if !m.is_empty() => flatten_into(m, &path, out),
            node => {
                out.insert(path, node.clone());
            }
        }
    }
}

impl NestedMap<Value> {
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, node)| (k.clone(), node.to_value()))
                .collect(),
        )
    }

    pub fn into_value(self) -> Value {
        Value::Object(
            self.entries
                .into_iter()
                .map(|(k, node)| (k, node.into_value()))
                .collect(),
        )
    }
}

/// Literal conversion: keys are used as single segments, dots included.
/// Use [`crate::merge::expand`] to interpret dotted keys.
impl TryFrom<Value> for NestedMap<Value> {
    type Error = ConfigError;

    fn try_from(value: Value) -> ConfigResult<Self> {
        match Node::from_value(value) {
            Node::Map(map) => Ok(map),
            Node::Leaf(other) => Err(ConfigError::InvalidArguments(format!(
                "expected a mapping, got {}",
                value_kind(&other)
            ))),
        }
    }
}

impl<V> FromIterator<(String, Node<V>)> for NestedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, Node<V>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<V> IntoIterator for NestedMap<V> {
    type Item = (String, Node<V>);
    type IntoIter = indexmap::map::IntoIter<String, Node<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, V> IntoIterator for &'a NestedMap<V> {
    type Item = (&'a String, &'a Node<V>);
    type IntoIter = indexmap::map::Iter<'a, String, Node<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<V: Serialize> Serialize for Node<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Leaf(v) => v.serialize(serializer),
            Node::Map(m) => m.serialize(serializer),
        }
    }
}

impl<V: Serialize> Serialize for NestedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter())
    }
}

impl<'de> Deserialize<'de> for NestedMap<Value> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        NestedMap::try_from(value).map_err(serde::de::Error::custom)
    }
}

/// Depth-first iterator over leaf paths; see [`NestedMap::allkeys`].
pub struct AllKeys<'a, V> {
    stack: Vec<(KeyPath, indexmap::map::Iter<'a, String, Node<V>>)>,
}

impl<'a, V> Iterator for AllKeys<'a, V> {
    type Item = KeyPath;

    fn next(&mut self) -> Option<KeyPath> {
        loop {
            let (prefix, iter) = self.stack.last_mut()?;
            match iter.next() {
                Some((key, Node::Leaf(_))) => return Some(prefix.child(key)),
                Some((key, Node::Map(map))) => {
                    let path = prefix.child(key);
                    self.stack.push((path, map.entries.iter()));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// Short name of a JSON value's type, for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> NestedMap {
        NestedMap::try_from(json!({
            "x1": 1,
            "x3": {
                "y1": 2,
                "y3": {"z1": 3, "z2": "text"},
                "y4": {}
            },
            "x2": "text_x2"
        }))
        .unwrap()
    }

    #[test]
    fn test_get_nested() {
        let map = sample();
        assert_eq!(*map.get("x3.y3.z1").unwrap(), json!(3));
        assert!(map.get("x3.y3").unwrap().is_map());
        assert_eq!(*map.get(["x3", "y1"]).unwrap(), json!(2));
    }

    #[test]
    fn test_get_missing_intermediate() {
        let map = sample();
        match map.get("x9.y1") {
            Err(ConfigError::KeyNotFound(path)) => assert_eq!(path, KeyPath::parse("x9")),
            other => panic!("Expected KeyNotFound, got {other:?}"),
        }
        assert!(matches!(map.get("x3.nope"), Err(ConfigError::KeyNotFound(_))));
    }

    #[test]
    fn test_get_through_leaf() {
        let map = sample();
        match map.get("x1.y1") {
            Err(ConfigError::TypeMismatch(path)) => assert_eq!(path, KeyPath::parse("x1")),
            other => panic!("Expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_get_empty_path() {
        assert!(matches!(sample().get(KeyPath::root()), Err(ConfigError::EmptyKey)));
    }

    #[test]
    fn test_set_without_create() {
        let mut map = sample();
        assert!(matches!(
            map.set("a.b", Node::Leaf(json!(1)), false),
            Err(ConfigError::KeyNotFound(_))
        ));
        let previous = map.set("x3.y1", Node::Leaf(json!(5)), false).unwrap();
        assert_eq!(previous, Some(Node::Leaf(json!(2))));
        assert_eq!(*map.get("x3.y1").unwrap(), json!(5));
    }

    #[test]
    fn test_set_with_create() {
        let mut map = sample();
        map.set("a.b.c", Node::Leaf(json!(true)), true).unwrap();
        assert_eq!(*map.get("a.b.c").unwrap(), json!(true));
    }

    #[test]
    fn test_set_through_leaf_is_error_even_with_create() {
        let mut map = sample();
        assert!(matches!(
            map.set("x1.y", Node::Leaf(json!(1)), true),
            Err(ConfigError::TypeMismatch(_))
        ));
        assert_eq!(*map.get("x1").unwrap(), json!(1));
    }

    #[test]
    fn test_contains() {
        let map = sample();
        assert!(map.contains("x1"));
        assert!(map.contains("x3.y3.z2"));
        assert!(!map.contains("x1.z1"));
        assert!(!map.contains("x.y.z"));
        assert!(!map.contains(KeyPath::root()));
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut map = sample();
        let removed = map.remove("x3").unwrap();
        assert!(removed.is_map());
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["x1", "x2"]);
        assert!(matches!(map.remove("x3"), Err(ConfigError::KeyNotFound(_))));
    }

    #[test]
    fn test_allkeys_order() {
        let keys: Vec<String> = sample().allkeys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["x1", "x3.y1", "x3.y3.z1", "x3.y3.z2", "x2"]);
    }

    #[test]
    fn test_allkeys_escapes_dotted_segments() {
        let map = NestedMap::try_from(json!({"a.b": {"c": 1}})).unwrap();
        let keys: Vec<String> = map.allkeys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["a\\.b.c"]);
        assert_eq!(*map.get("a\\.b.c").unwrap(), json!(1));
    }

    #[test]
    fn test_flatten() {
        let flat = sample().flatten();
        assert_eq!(flat.len(), 5);
        assert_eq!(flat[&KeyPath::parse("x3.y3.z2")], json!("text"));
    }

    #[test]
    fn test_flatten_keeps_empty_maps() {
        let map = NestedMap::try_from(json!({"a": {}, "b": 1, "c": {"d": {}}})).unwrap();
        let flat = map.flatten();
        assert_eq!(flat.keys().map(ToString::to_string).collect::<Vec<_>>(), vec!["a", "b", "c.d"]);
        assert_eq!(flat[&KeyPath::parse("c.d")], Node::Map(NestedMap::new()));
    }

    #[test]
    fn test_value_conversion() {
        let value = json!({"b": 1, "a": {"c": [1, 2]}});
        let map = NestedMap::try_from(value.clone()).unwrap();
        assert_eq!(map.to_value(), value);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a"]);

        assert!(matches!(
            NestedMap::try_from(json!(3)),
            Err(ConfigError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_map_leaves() {
        let doubled = sample().map_leaves(|v| match v {
            Value::Number(n) => json!(n.as_i64().unwrap_or_default() * 2),
            other => other,
        });
        assert_eq!(*doubled.get("x3.y3.z1").unwrap(), json!(6));
    }

    #[test]
    fn test_serde_round_trip() {
        let map = sample();
        let text = serde_json::to_string(&map).unwrap();
        let back: NestedMap = serde_json::from_str(&text).unwrap();
        assert_eq!(back, map);
    }
}
