//! Field-wise merge of node documents.

use serde_json::{Map, Value};

/// Merge `incoming` into `target`, incoming values winning.
///
/// When both sides hold an object under the same field the objects are merged
/// recursively. Any other incoming value (scalars, arrays, `null`) replaces
/// what was there. Fields only present in `target` are kept.
pub fn deep_merge(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (field, value) in incoming {
        let Value::Object(inner) = value else {
            target.insert(field, value);
            continue;
        };
        if let Some(Value::Object(existing)) = target.get_mut(&field) {
            deep_merge(existing, inner);
            continue;
        }
        target.insert(field, Value::Object(inner));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn incoming_fields_win_and_existing_fields_stay() {
        let mut target = obj(json!({"a": 1, "b": 1}));
        deep_merge(&mut target, obj(json!({"b": 2, "c": 3})));
        assert_eq!(Value::Object(target), json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn nested_metadata_merges_recursively() {
        let mut target = obj(json!({
            "_": {"#": "user/1", ">": {"name": 1}},
            "name": "ada"
        }));
        deep_merge(
            &mut target,
            obj(json!({
                "_": {"#": "user/1", ">": {"age": 2}},
                "age": 36
            })),
        );
        assert_eq!(
            Value::Object(target),
            json!({
                "_": {"#": "user/1", ">": {"name": 1, "age": 2}},
                "name": "ada",
                "age": 36
            })
        );
    }

    #[test]
    fn object_replaces_scalar_and_scalar_replaces_object() {
        let mut target = obj(json!({"a": 5, "b": {"x": 1}}));
        deep_merge(&mut target, obj(json!({"a": {"y": 2}, "b": 7})));
        assert_eq!(Value::Object(target), json!({"a": {"y": 2}, "b": 7}));
    }

    #[test]
    fn null_and_arrays_replace() {
        let mut target = obj(json!({"a": {"x": 1}, "list": [1, 2, 3]}));
        deep_merge(&mut target, obj(json!({"a": null, "list": [9]})));
        assert_eq!(Value::Object(target), json!({"a": null, "list": [9]}));
    }

    #[test]
    fn empty_incoming_object_keeps_existing_object() {
        let mut target = obj(json!({"a": {"x": 1}}));
        deep_merge(&mut target, obj(json!({"a": {}, "b": {}})));
        assert_eq!(Value::Object(target), json!({"a": {"x": 1}, "b": {}}));
    }
}
