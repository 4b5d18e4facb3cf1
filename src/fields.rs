//! Dotted-path lookup over untyped object trees.
//!
//! A fetched object is an arbitrary JSON tree (mappings, sequences,
//! scalars, null). A field path like `spec.template.metadata` is resolved
//! one segment at a time; every intermediate step must be a mapping. A
//! missing segment or a non-mapping intermediate yields `None` — the caller
//! omits the path from the fingerprint rather than erroring.

use serde_json::Value;

/// Path selecting the entire object.
pub const WHOLE_OBJECT: &str = "*";

/// Resolve a dotted path against a tree.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path == WHOLE_OBJECT {
        return Some(root);
    }

    let mut current = root;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Value {
        json!({
            "metadata": {"name": "cm", "labels": {"app": "demo"}},
            "data": {"config": "a", "count": 3, "flags": ["x", "y"]},
        })
    }

    #[test]
    fn wildcard_returns_root() {
        let root = tree();
        assert_eq!(lookup_path(&root, "*"), Some(&root));
    }

    #[test]
    fn resolves_nested_paths() {
        let root = tree();
        assert_eq!(lookup_path(&root, "data.config"), Some(&json!("a")));
        assert_eq!(lookup_path(&root, "metadata.labels.app"), Some(&json!("demo")));
        assert_eq!(lookup_path(&root, "data"), Some(&json!({"config": "a", "count": 3, "flags": ["x", "y"]})));
    }

    #[test]
    fn missing_segment_is_none() {
        let root = tree();
        assert_eq!(lookup_path(&root, "data.missing"), None);
        assert_eq!(lookup_path(&root, "absent.config"), None);
    }

    #[test]
    fn non_mapping_intermediate_is_none() {
        let root = tree();
        // data.config is a scalar; descending through it fails quietly.
        assert_eq!(lookup_path(&root, "data.config.deeper"), None);
        // Sequences are not traversable either.
        assert_eq!(lookup_path(&root, "data.flags.0"), None);
    }

    #[test]
    fn scalar_root_only_matches_wildcard() {
        let root = json!(42);
        assert_eq!(lookup_path(&root, "*"), Some(&json!(42)));
        assert_eq!(lookup_path(&root, "anything"), None);
    }
}
