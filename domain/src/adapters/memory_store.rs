use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Node, NodeBackend, NodeKey, StoreError};

/// Field the document store reserves for the key.
const ID_FIELD: &str = "_id";

/// In-memory node backend. Merges happen under the map's mutex, so
/// concurrent writers to one key never lose fields.
pub struct InMemoryBackend {
    inner: Mutex<BTreeMap<String, Node>>,
    operations: AtomicU64,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
            operations: AtomicU64::new(0),
        }
    }

    /// Seed a node directly, bypassing merge and the operation counter.
    pub fn insert(&self, key: &NodeKey, node: Node) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(key.as_str().to_string(), node);
        }
    }

    /// Number of `find`/`merge_upsert` calls that reached this backend.
    pub fn operations(&self) -> u64 {
        self.operations.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Node>>, StoreError> {
        self.operations.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lock()
            .map_err(|_| StoreError::Internal("mutex poisoned".into()))
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeBackend for InMemoryBackend {
    async fn find(&self, key: &NodeKey) -> Result<Option<Node>, StoreError> {
        let map = self.lock()?;
        Ok(map.get(key.as_str()).cloned())
    }

    async fn merge_upsert(&self, key: &NodeKey, mut node: Node) -> Result<(), StoreError> {
        node.remove(ID_FIELD);
        let mut map = self.lock()?;
        map.entry(key.as_str().to_string())
            .or_default()
            .merge(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_inserts_then_merges() {
        let backend = InMemoryBackend::new();
        let key = NodeKey::new("k");
        backend
            .merge_upsert(&key, Node::from_value(json!({"a": 1})).unwrap())
            .await
            .unwrap();
        backend
            .merge_upsert(&key, Node::from_value(json!({"a": 2, "b": 3})).unwrap())
            .await
            .unwrap();
        let got = backend.find(&key).await.unwrap().unwrap();
        assert_eq!(got.into_value(), json!({"a": 2, "b": 3}));
        assert_eq!(backend.operations(), 3);
    }

    #[tokio::test]
    async fn incoming_id_is_ignored() {
        let backend = InMemoryBackend::new();
        let key = NodeKey::new("k");
        backend
            .merge_upsert(&key, Node::from_value(json!({"_id": "other", "a": 1})).unwrap())
            .await
            .unwrap();
        let got = backend.find(&key).await.unwrap().unwrap();
        assert_eq!(got.into_value(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn empty_node_creates_document() {
        let backend = InMemoryBackend::new();
        let key = NodeKey::new("k");
        backend.merge_upsert(&key, Node::new()).await.unwrap();
        assert_eq!(backend.find(&key).await.unwrap(), Some(Node::new()));
        assert_eq!(backend.len(), 1);
    }
}
