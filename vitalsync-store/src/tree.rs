//! Path operations on JSON key trees.
//!
//! The store never holds `null` leaves or empty objects: writing `null`
//! removes a key, and a parent left empty disappears with it.

use serde_json::{Map, Value};

/// Split a slash-separated path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Look up the value at `segments` below `root`.
///
/// Returns `None` when the path does not exist.
pub fn get<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object()?.get(*segment)?;
    }
    (!node.is_null()).then_some(node)
}

/// Replace the value at `segments` below `root`.
///
/// Setting `null` removes the key and prunes parents left empty.
pub fn set(root: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *root = prune(value);
        return;
    };

    if !root.is_object() {
        if value.is_null() {
            return;
        }
        *root = Value::Object(Map::new());
    }

    let now_empty = match root {
        Value::Object(map) => {
            let remove = {
                let child = map.entry(first.to_string()).or_insert(Value::Null);
                set(child, rest, value);
                child.is_null()
            };
            if remove {
                map.remove(*first);
            }
            map.is_empty()
        }
        _ => false,
    };

    if now_empty {
        *root = Value::Null;
    }
}

/// Apply a multi-key update: each child of `update` replaces the value at
/// `segments/<key>`.
pub fn merge(root: &mut Value, segments: &[&str], update: Map<String, Value>) {
    for (key, value) in update {
        let mut path: Vec<&str> = segments.to_vec();
        path.extend(self::segments(&key));
        set(root, &path, value);
    }
}

/// Strip `null` leaves and empty objects from a value.
fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if pruned.is_empty() {
                Value::Null
            } else {
                Value::Object(pruned)
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segments() {
        assert_eq!(segments("/sensors/heart/"), vec!["sensors", "heart"]);
        assert_eq!(segments("text"), vec!["text"]);
        assert!(segments("/").is_empty());
    }

    #[test]
    fn test_set_and_get() {
        let mut root = Value::Null;
        set(&mut root, &["sensors", "heart"], json!({ "bpm": 72 }));
        set(&mut root, &["sensors", "dht11", "temperature"], json!(37.2));

        assert_eq!(get(&root, &["sensors", "heart", "bpm"]), Some(&json!(72)));
        assert_eq!(
            get(&root, &["sensors", "dht11"]),
            Some(&json!({ "temperature": 37.2 }))
        );
        assert_eq!(get(&root, &["text"]), None);
    }

    #[test]
    fn test_set_null_prunes_parents() {
        let mut root = json!({ "sensors": { "heart": { "bpm": 72 } }, "text": "hi" });
        set(&mut root, &["sensors", "heart", "bpm"], Value::Null);
        assert_eq!(root, json!({ "text": "hi" }));

        set(&mut root, &["text"], Value::Null);
        assert_eq!(root, Value::Null);
    }

    #[test]
    fn test_set_root_prunes_nested_nulls() {
        let mut root = json!({ "a": 1 });
        set(&mut root, &[], json!({ "b": null, "c": { "d": null }, "e": 2 }));
        assert_eq!(root, json!({ "e": 2 }));
    }

    #[test]
    fn test_merge() {
        let mut root = json!({ "heart": { "bpm": 70, "spo2": 97 } });
        let update = json!({ "bpm": 75, "ir/raw": 1200 });
        merge(&mut root, &["heart"], update.as_object().unwrap().clone());

        assert_eq!(
            root,
            json!({ "heart": { "bpm": 75, "spo2": 97, "ir": { "raw": 1200 } } })
        );
    }
}
