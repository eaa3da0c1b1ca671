//! Deep merge and dotted-key expansion.

use crate::error::{ConfigError, ConfigResult};
use crate::map::{value_kind, NestedMap, Node};
use crate::path::KeyPath;
use serde_json::Value;

/// Deep-merge `b` into a copy of `a`.
///
/// Where both sides hold a map, the maps merge recursively. Everywhere else
/// `b`'s node replaces `a`'s, including leaf-over-map and map-over-leaf.
pub fn merge<V: Clone>(a: &NestedMap<V>, b: &NestedMap<V>) -> NestedMap<V> {
    let mut out = a.clone();
    merge_into(&mut out, b.clone());
    out
}

/// In-place variant of [`merge`].
pub fn merge_into<V>(a: &mut NestedMap<V>, b: NestedMap<V>) {
    for (key, node) in b {
        let node = match (a.get_entry_mut(&key), node) {
            (Some(Node::Map(existing)), Node::Map(incoming)) => {
                merge_into(existing, incoming);
                continue;
            }
            (_, node) => node,
        };
        a.insert(key, node);
    }
}

/// Expand a JSON object whose keys may be dotted paths into a fully
/// nested map, recursing into nested objects.
///
/// `{"a.b": 1, "a": {"c": 2}}` becomes `{"a": {"b": 1, "c": 2}}`.
pub fn expand(input: Value) -> ConfigResult<NestedMap> {
    match input {
        Value::Object(obj) => {
            let mut out = NestedMap::new();
            for (key, value) in obj {
                let node = expand_value(value)?;
                insert_expanded(&mut out, &KeyPath::parse(&key), node)?;
            }
            Ok(out)
        }
        other => Err(ConfigError::InvalidArguments(format!(
            "expected a mapping, got {}",
            value_kind(&other)
        ))),
    }
}

/// Expand a single value: objects are expanded, everything else is a leaf.
pub fn expand_value(value: Value) -> ConfigResult<Node> {
    match value {
        obj @ Value::Object(_) => expand(obj).map(Node::Map),
        other => Ok(Node::Leaf(other)),
    }
}

/// Expand `(path, node)` entries into a nested map.
///
/// Entry nodes must already be nested; only the entry paths are expanded.
pub fn expand_entries<V, K, I>(entries: I) -> ConfigResult<NestedMap<V>>
where
    I: IntoIterator<Item = (K, Node<V>)>,
    K: Into<KeyPath>,
{
    let mut out = NestedMap::new();
    for (key, node) in entries {
        insert_expanded(&mut out, &key.into(), node)?;
    }
    Ok(out)
}

/// Place `node` at `path` inside `out`, creating intermediate maps.
///
/// Two maps at the same path merge; a leaf meeting a map (in either
/// direction) is a `TypeMismatch` at the offending prefix.
pub(crate) fn insert_expanded<V>(
    out: &mut NestedMap<V>,
    path: &KeyPath,
    node: Node<V>,
) -> ConfigResult<()> {
    let (last, init) = path.segments().split_last().ok_or(ConfigError::EmptyKey)?;

    let mut map = out;
    for (idx, segment) in init.iter().enumerate() {
        if !map.contains_key(segment) {
            map.insert(segment.clone(), Node::Map(NestedMap::new()));
        }
        map = match map.get_entry_mut(segment) {
            Some(Node::Map(m)) => m,
            _ => return Err(ConfigError::TypeMismatch(path.prefix(idx + 1))),
        };
    }

    let node = match (map.get_entry_mut(last), node) {
        (Some(Node::Map(existing)), Node::Map(incoming)) => {
            merge_into(existing, incoming);
            return Ok(());
        }
        (Some(Node::Map(_)), Node::Leaf(_)) | (Some(Node::Leaf(_)), Node::Map(_)) => {
            return Err(ConfigError::TypeMismatch(path.clone()));
        }
        (_, node) => node,
    };
    map.insert(last.clone(), node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn map(value: Value) -> NestedMap {
        NestedMap::try_from(value).unwrap()
    }

    #[test]
    fn test_merge_recurses_into_maps() {
        let a = map(json!({"x": {"a": 1, "b": 2}, "y": 1}));
        let b = map(json!({"x": {"b": 3, "c": 4}, "z": 5}));
        let merged = merge(&a, &b);
        assert_eq!(merged.to_value(), json!({"x": {"a": 1, "b": 3, "c": 4}, "y": 1, "z": 5}));
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let a = map(json!({"x": {"a": 1}}));
        let b = map(json!({"x": {"a": 2}}));
        let _ = merge(&a, &b);
        assert_eq!(a.to_value(), json!({"x": {"a": 1}}));
        assert_eq!(b.to_value(), json!({"x": {"a": 2}}));
    }

    #[test]
    fn test_merge_replaces_across_kinds() {
        let a = map(json!({"leaf": 1, "node": {"a": 1}}));
        let b = map(json!({"leaf": {"now": "map"}, "node": "now leaf"}));
        let merged = merge(&a, &b);
        assert_eq!(merged.to_value(), json!({"leaf": {"now": "map"}, "node": "now leaf"}));
    }

    #[test]
    fn test_expand_dotted_keys() {
        let expanded = expand(json!({"a.b": 1, "a": {"c.d": 2}, "e": 3})).unwrap();
        assert_eq!(expanded.to_value(), json!({"a": {"b": 1, "c": {"d": 2}}, "e": 3}));
    }

    #[test]
    fn test_expand_escaped_dot() {
        let expanded = expand(json!({"hosts.db\\.local": 1})).unwrap();
        assert_eq!(expanded.to_value(), json!({"hosts": {"db.local": 1}}));
    }

    #[test]
    fn test_expand_leaf_then_nested_assignment() {
        match expand(json!({"a.b": 1, "a.b.c": 2})) {
            Err(ConfigError::TypeMismatch(path)) => assert_eq!(path, KeyPath::parse("a.b")),
            other => panic!("Expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_expand_map_then_leaf_assignment() {
        assert!(matches!(
            expand(json!({"a.b": 1, "a": 2})),
            Err(ConfigError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_expand_rejects_non_mapping() {
        assert!(matches!(expand(json!([1, 2])), Err(ConfigError::InvalidArguments(_))));
    }

    #[test]
    fn test_expand_entries_with_tuple_keys() {
        let expanded: NestedMap = expand_entries(vec![
            (KeyPath::from(["b", "d"]), Node::Leaf(json!(-1))),
            (KeyPath::parse("b.e"), Node::Leaf(json!(-2))),
        ])
        .unwrap();
        assert_eq!(expanded.to_value(), json!({"b": {"d": -1, "e": -2}}));
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-z ]{0,8}".prop_map(Value::from),
            Just(Value::Null),
        ]
    }

    // Plain segment names; dotted ones would be split again by expansion.
    fn tree() -> impl Strategy<Value = NestedMap> {
        let node = leaf().prop_map(Node::Leaf).prop_recursive(3, 24, 4, |inner| {
            prop::collection::vec(("[a-z]{1,3}", inner), 0..4)
                .prop_map(|entries| Node::Map(entries.into_iter().collect()))
        });
        prop::collection::vec(("[a-z]{1,3}", node), 0..5).prop_map(|entries| entries.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_expand_flatten_round_trip(x in tree()) {
            let back: NestedMap = expand_entries(x.flatten()).unwrap();
            prop_assert_eq!(back, x);
        }

        #[test]
        fn prop_merge_precedence(a in tree(), b in tree()) {
            let merged = merge(&a, &b);
            for (path, node) in b.flatten() {
                let found = merged.get(&path).unwrap();
                match node {
                    Node::Leaf(_) => prop_assert_eq!(found, &node),
                    Node::Map(_) => prop_assert!(found.is_map()),
                }
            }
            for (path, node) in a.flatten() {
                if !b.contains(&path) && !path_blocked_by(&b, &path) {
                    prop_assert_eq!(merged.get(&path).unwrap(), &node);
                }
            }
        }
    }

    // True when some proper prefix of `path` is a leaf in `b`, which
    // replaces the whole subtree in the merge.
    fn path_blocked_by(b: &NestedMap, path: &KeyPath) -> bool {
        (1..path.len()).any(|n| matches!(b.get(path.prefix(n)), Ok(Node::Leaf(_))))
    }
}
