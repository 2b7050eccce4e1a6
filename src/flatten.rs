//! Conversion between nested catalogs and dotted key paths.
//!
//! Traversal is iterative so deeply nested documents never hit the call stack.

use crate::catalog::{Group, Node};
use std::collections::BTreeMap;
use std::fmt;

/// Joins group names into a key path.
pub const SEPARATOR: char = '.';

/// Dotted key path → leaf text. Sorted so every consumer iterates
/// deterministically.
pub type FlatCatalog = BTreeMap<String, String>;

/// Append `key` to a key path prefix (empty prefix means the root).
pub fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}{}{}", prefix, SEPARATOR, key)
    }
}

/// Emit every leaf as `(path, text)`. Groups without leaves emit nothing.
pub fn flatten(root: &Group) -> FlatCatalog {
    let mut flat = FlatCatalog::new();
    let mut stack: Vec<(String, &Group)> = vec![(String::new(), root)];

    while let Some((prefix, group)) = stack.pop() {
        for (key, node) in group {
            let path = join_path(&prefix, key);
            match node {
                Node::Leaf(text) => {
                    flat.insert(path, text.clone());
                }
                Node::Group(child) => stack.push((path, child)),
            }
        }
    }

    flat
}

/// Build a fresh tree from a flat mapping.
pub fn unflatten(flat: &FlatCatalog) -> Group {
    let mut root = Group::new();
    for (path, text) in flat {
        unflatten_into(&mut root, path, text.clone());
    }
    root
}

/// A lossy overwrite performed while merging one key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralConflict {
    /// An intermediate segment held a leaf; it became an empty group.
    LeafReplacedByGroup { path: String, previous: String },
    /// The final segment held a group; it was replaced by the leaf.
    GroupReplacedByLeaf { path: String },
}

impl fmt::Display for StructuralConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralConflict::LeafReplacedByGroup { path, previous } => write!(
                f,
                "leaf '{}' (\"{}\") replaced by a group",
                path, previous
            ),
            StructuralConflict::GroupReplacedByLeaf { path } => {
                write!(f, "group '{}' replaced by a leaf", path)
            }
        }
    }
}

/// Set the leaf at `path` to `value`, creating missing groups on the way.
///
/// Siblings are never touched: an existing key keeps its position, a new key
/// is appended to the end of its group. Structural conflicts are resolved by
/// overwriting and returned to the caller for reporting.
pub fn unflatten_into(root: &mut Group, path: &str, value: String) -> Vec<StructuralConflict> {
    let mut conflicts = Vec::new();
    let mut segments: Vec<&str> = path.split(SEPARATOR).collect();
    // split always yields at least one segment
    let leaf_name = segments.pop().unwrap_or(path);

    let mut group = root;
    let mut walked = String::new();
    for segment in segments {
        walked = join_path(&walked, segment);
        let node = group
            .entry(segment.to_string())
            .or_insert_with(|| Node::Group(Group::new()));
        if let Node::Leaf(previous) = node {
            conflicts.push(StructuralConflict::LeafReplacedByGroup {
                path: walked.clone(),
                previous: std::mem::take(previous),
            });
            *node = Node::Group(Group::new());
        }
        group = match node {
            Node::Group(child) => child,
            Node::Leaf(_) => unreachable!("leaf replaced by a group above"),
        };
    }

    if let Some(Node::Group(_)) = group.get(leaf_name) {
        conflicts.push(StructuralConflict::GroupReplacedByLeaf {
            path: path.to_string(),
        });
    }
    group.insert(leaf_name.to_string(), Node::Leaf(value));

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use proptest::prelude::*;

    fn parse(text: &str) -> Group {
        Catalog::parse("en", text).unwrap().0.root().clone()
    }

    // ==================== flatten Tests ====================

    #[test]
    fn test_flatten_nested() {
        let root = parse(r#"{"a": {"b": "X", "c": {"d": "Y"}}, "e": "Z"}"#);
        let flat = flatten(&root);

        assert_eq!(flat.len(), 3);
        assert_eq!(flat.get("a.b").map(String::as_str), Some("X"));
        assert_eq!(flat.get("a.c.d").map(String::as_str), Some("Y"));
        assert_eq!(flat.get("e").map(String::as_str), Some("Z"));
    }

    #[test]
    fn test_flatten_empty_groups_emit_nothing() {
        let root = parse(r#"{"a": {}, "b": {"c": {}}}"#);
        assert!(flatten(&root).is_empty());
    }

    #[test]
    fn test_flatten_is_sorted() {
        let root = parse(r#"{"z": "1", "a": {"y": "2", "b": "3"}}"#);
        let keys: Vec<String> = flatten(&root).into_keys().collect();
        assert_eq!(keys, vec!["a.b", "a.y", "z"]);
    }

    #[test]
    fn test_flatten_deeply_nested_does_not_overflow() {
        let mut root = Group::new();
        let path = (0..1000).map(|i| format!("n{}", i)).collect::<Vec<_>>().join(".");
        unflatten_into(&mut root, &path, "deep".to_string());

        let flat = flatten(&root);
        assert_eq!(flat.get(&path).map(String::as_str), Some("deep"));
    }

    // ==================== unflatten_into Tests ====================

    #[test]
    fn test_unflatten_into_creates_intermediate_groups() {
        let mut root = Group::new();
        let conflicts = unflatten_into(&mut root, "a.b.c", "V".to_string());

        assert!(conflicts.is_empty());
        assert_eq!(root, parse(r#"{"a": {"b": {"c": "V"}}}"#));
    }

    #[test]
    fn test_unflatten_into_keeps_siblings() {
        let mut root = parse(r#"{"a": {"b": "X"}, "z": "last"}"#);
        unflatten_into(&mut root, "a.c", "Z".to_string());

        assert_eq!(root, parse(r#"{"a": {"b": "X", "c": "Z"}, "z": "last"}"#));
        let inner: Vec<&str> = root["a"].as_group().unwrap().keys().map(String::as_str).collect();
        assert_eq!(inner, vec!["b", "c"]);
    }

    #[test]
    fn test_unflatten_into_overwrite_keeps_position() {
        let mut root = parse(r#"{"a": "1", "b": "2", "c": "3"}"#);
        unflatten_into(&mut root, "b", "two".to_string());

        let keys: Vec<&str> = root.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(root["b"], Node::Leaf("two".to_string()));
    }

    #[test]
    fn test_unflatten_into_leaf_conflict_becomes_group() {
        let mut root = parse(r#"{"a": "was a leaf", "keep": "k"}"#);
        let conflicts = unflatten_into(&mut root, "a.b", "V".to_string());

        assert_eq!(
            conflicts,
            vec![StructuralConflict::LeafReplacedByGroup {
                path: "a".to_string(),
                previous: "was a leaf".to_string(),
            }]
        );
        assert_eq!(root, parse(r#"{"a": {"b": "V"}, "keep": "k"}"#));
    }

    #[test]
    fn test_unflatten_into_group_conflict_becomes_leaf() {
        let mut root = parse(r#"{"a": {"b": {"c": "X"}}}"#);
        let conflicts = unflatten_into(&mut root, "a.b", "V".to_string());

        assert_eq!(
            conflicts,
            vec![StructuralConflict::GroupReplacedByLeaf {
                path: "a.b".to_string()
            }]
        );
        assert_eq!(root, parse(r#"{"a": {"b": "V"}}"#));
    }

    #[test]
    fn test_conflict_display() {
        let conflict = StructuralConflict::GroupReplacedByLeaf {
            path: "x.y".to_string(),
        };
        assert_eq!(conflict.to_string(), "group 'x.y' replaced by a leaf");
    }

    // ==================== Property Tests ====================

    fn segment() -> impl Strategy<Value = String> {
        "[a-z_]{1,6}"
    }

    fn flat_catalog() -> impl Strategy<Value = FlatCatalog> {
        proptest::collection::btree_map(
            proptest::collection::vec(segment(), 1..4).prop_map(|s| s.join(".")),
            ".{0,12}",
            0..24,
        )
    }

    /// Build a tree with no empty groups and no leaf/group collisions.
    fn tree() -> impl Strategy<Value = Group> {
        flat_catalog().prop_map(|flat| {
            let mut root = Group::new();
            for (path, text) in flat {
                let clashes = root_conflicts(&root, &path);
                if !clashes {
                    unflatten_into(&mut root, &path, text);
                }
            }
            root
        })
    }

    fn root_conflicts(root: &Group, path: &str) -> bool {
        let mut scratch = root.clone();
        !unflatten_into(&mut scratch, path, String::new()).is_empty()
    }

    proptest! {
        #[test]
        fn prop_unflatten_flatten_roundtrip(root in tree()) {
            let rebuilt = unflatten(&flatten(&root));
            prop_assert_eq!(rebuilt, root);
        }

        #[test]
        fn prop_merge_is_non_destructive(
            root in tree(),
            extra in proptest::collection::vec(segment(), 1..4),
            text in ".{0,12}",
        ) {
            let path = extra.join(".");
            let before = flatten(&root);
            let mut merged = root.clone();
            let conflicts = unflatten_into(&mut merged, &path, text.clone());
            prop_assume!(conflicts.is_empty());

            let after = flatten(&merged);
            prop_assert_eq!(after.get(&path), Some(&text));
            for (other, value) in &before {
                if other != &path {
                    prop_assert_eq!(after.get(other), Some(value));
                }
            }
        }
    }
}
