//! Mapping between nodes and BSON documents.

use domain::{Node, NodeKey, StoreError};
use mongodb::bson::{self, doc, Bson, Document};
use serde_json::{Map, Value};

/// Field holding the node key.
pub(crate) const ID_FIELD: &str = "_id";

/// How a node can be merged into the stored document.
#[derive(Debug, PartialEq)]
pub(crate) enum SetPlan {
    /// Dotted `$set` paths; the server merges atomically.
    Paths(Document),
    /// The node has shapes `$set` cannot express; merge client-side.
    ReadMerge,
}

pub(crate) fn key_filter(key: &NodeKey) -> Document {
    doc! { "_id": key.as_str() }
}

/// Stored document to node, dropping the `_id` the adapter owns.
pub(crate) fn document_to_node(mut document: Document) -> Node {
    document.remove(ID_FIELD);
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => Node::from(map),
        _ => Node::new(),
    }
}

pub(crate) fn node_to_document(node: &Node) -> Result<Document, StoreError> {
    let mut document = bson::to_document(node.as_map())
        .map_err(|e| StoreError::Internal(format!("encode node: {e}")))?;
    document.remove(ID_FIELD);
    Ok(document)
}

/// Flatten a node into `$set` paths (`{"_": {">": {"a": 1}}}` becomes
/// `{"_.>.a": 1}`), which gives the same result as a deep merge.
///
/// Falls back to [`SetPlan::ReadMerge`] for an empty node, empty nested
/// objects (a merge keeps an existing object there, `$set` would clobber it),
/// field names a path cannot address, and all-digit nested field names (the
/// server would write into an array element where a merge replaces the array).
pub(crate) fn set_paths(node: &Node) -> Result<SetPlan, StoreError> {
    let mut set = Document::new();
    if !flatten_into(&mut set, None, node.as_map())? || set.is_empty() {
        return Ok(SetPlan::ReadMerge);
    }
    Ok(SetPlan::Paths(set))
}

fn flatten_into(
    set: &mut Document,
    prefix: Option<&str>,
    map: &Map<String, Value>,
) -> Result<bool, StoreError> {
    for (field, value) in map {
        if prefix.is_none() && field == ID_FIELD {
            continue;
        }
        if field.is_empty() || field.contains('.') || field.starts_with('$') {
            return Ok(false);
        }
        // A numeric segment below the root indexes into a stored array.
        if prefix.is_some() && field.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(false);
        }
        let path = match prefix {
            Some(p) => format!("{p}.{field}"),
            None => field.clone(),
        };
        match value {
            Value::Object(inner) if inner.is_empty() => return Ok(false),
            Value::Object(inner) => {
                if !flatten_into(set, Some(&path), inner)? {
                    return Ok(false);
                }
            }
            other => {
                let encoded = bson::to_bson(other)
                    .map_err(|e| StoreError::Internal(format!("encode field {path}: {e}")))?;
                set.insert(path, encoded);
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(v: Value) -> Node {
        Node::from_value(v).unwrap()
    }

    #[test]
    fn nested_objects_flatten_to_dotted_paths() {
        let plan = set_paths(&node(json!({
            "name": "ada",
            "_": {"#": "user/1", ">": {"name": 1.5}}
        })))
        .unwrap();
        assert_eq!(
            plan,
            SetPlan::Paths(doc! {
                "name": "ada",
                "_.#": "user/1",
                "_.>.name": 1.5,
            })
        );
    }

    #[test]
    fn top_level_id_is_skipped() {
        let plan = set_paths(&node(json!({"_id": "other", "a": true}))).unwrap();
        assert_eq!(plan, SetPlan::Paths(doc! { "a": true }));
    }

    #[test]
    fn digit_fields_at_the_root_stay_atomic() {
        let plan = set_paths(&node(json!({"0": 1, "a": {"b0": 2}}))).unwrap();
        assert_eq!(plan, SetPlan::Paths(doc! { "0": 1_i64, "a.b0": 2_i64 }));
    }

    #[test]
    fn null_and_arrays_are_set_whole() {
        let plan = set_paths(&node(json!({"gone": null, "list": [1, 2]}))).unwrap();
        assert_eq!(
            plan,
            SetPlan::Paths(doc! { "gone": Bson::Null, "list": [1_i64, 2_i64] })
        );
    }

    #[test]
    fn unaddressable_shapes_need_read_merge() {
        for v in [
            json!({}),
            json!({"_id": "k"}),
            json!({"a": {}}),
            json!({"a": {"b": {}}}),
            json!({"a.b": 1}),
            json!({"$inc": 1}),
            json!({"": 1}),
            json!({"a": {"$oid": "x"}}),
            json!({"a": {"0": 1}}),
            json!({"list": {"b": {"12": true}}}),
        ] {
            assert_eq!(set_paths(&node(v.clone())).unwrap(), SetPlan::ReadMerge, "{v}");
        }
    }

    #[test]
    fn document_round_trips_without_id() {
        let original = node(json!({"a": 1, "b": {"c": "x"}, "d": [true, null]}));
        let mut stored = node_to_document(&original).unwrap();
        stored.insert("_id", "k");
        assert_eq!(document_to_node(stored), original);
    }

    #[test]
    fn node_id_never_reaches_document() {
        let doc = node_to_document(&node(json!({"_id": "x", "a": 1}))).unwrap();
        assert!(!doc.contains_key(ID_FIELD));
        assert_eq!(key_filter(&NodeKey::new("k")), doc! { "_id": "k" });
    }
}
