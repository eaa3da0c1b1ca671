//! Update input for a config store.

use crate::error::{ConfigError, ConfigResult};
use crate::map::{NestedMap, Node};
use crate::merge::{expand, expand_value, insert_expanded};
use crate::path::KeyPath;
use serde_json::Value;

/// A requested change to one leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Set(Value),
    /// Delete the key (and everything below it).
    Remove,
}

/// A fully expanded tree of [`Change`]s, consumed by `update` and `replace`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    tree: NestedMap<Change>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A patch removing a single key.
    pub fn removal(path: impl Into<KeyPath>) -> ConfigResult<Self> {
        let mut patch = Self::new();
        patch.remove(path)?;
        Ok(patch)
    }

    /// Expand a JSON object with dotted keys into a patch of `Set` changes.
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        Ok(expand(value)?.into())
    }

    /// Set `path` to `value`. Objects are expanded and merged with changes
    /// already in the patch.
    pub fn set(&mut self, path: impl Into<KeyPath>, value: impl Into<Value>) -> ConfigResult<&mut Self> {
        let node = expand_value(value.into())?.map_leaves(&mut Change::Set);
        insert_expanded(&mut self.tree, &path.into(), node)?;
        Ok(self)
    }

    /// Request removal of `path`.
    pub fn remove(&mut self, path: impl Into<KeyPath>) -> ConfigResult<&mut Self> {
        insert_expanded(&mut self.tree, &path.into(), Node::Leaf(Change::Remove))?;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn tree(&self) -> &NestedMap<Change> {
        &self.tree
    }

    pub fn into_tree(self) -> NestedMap<Change> {
        self.tree
    }
}

impl From<NestedMap> for Patch {
    fn from(map: NestedMap) -> Self {
        Self {
            tree: map.map_leaves(Change::Set),
        }
    }
}

impl From<NestedMap<Change>> for Patch {
    fn from(tree: NestedMap<Change>) -> Self {
        Self { tree }
    }
}

impl TryFrom<Value> for Patch {
    type Error = ConfigError;

    fn try_from(value: Value) -> ConfigResult<Self> {
        Patch::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_remove() {
        let mut patch = Patch::new();
        patch.set("a.b", 1).unwrap().remove("a.c").unwrap();

        let tree = patch.tree();
        assert_eq!(tree.get("a.b").unwrap(), &Node::Leaf(Change::Set(json!(1))));
        assert_eq!(tree.get("a.c").unwrap(), &Node::Leaf(Change::Remove));
    }

    #[test]
    fn test_set_object_is_expanded() {
        let mut patch = Patch::new();
        patch.set("a", json!({"b.c": 1})).unwrap();
        assert_eq!(
            patch.tree().get("a.b.c").unwrap(),
            &Node::Leaf(Change::Set(json!(1)))
        );
    }

    #[test]
    fn test_remove_conflicts_with_nested_set() {
        let mut patch = Patch::new();
        patch.set("a.b", 1).unwrap();
        assert!(matches!(patch.remove("a"), Err(ConfigError::TypeMismatch(_))));
    }

    #[test]
    fn test_from_value_requires_mapping() {
        assert!(matches!(
            Patch::try_from(json!("badarg")),
            Err(ConfigError::InvalidArguments(_))
        ));
    }
}
