use async_trait::async_trait;
use tracing::{debug, error};

use crate::{
    AccessMode, LostReason, Node, NodeBackend, NodeKey, NodeStore, PutOutcome, Refusal,
    StoreError,
};

/// Adapter service binding the host's storage contract to a backend.
///
/// It owns the static configuration that decides whether a call may reach
/// storage at all: an optional backend (absent when the host supplied no
/// connection options) and the access mode. Gated calls never touch the
/// backend. Everything that passes is delegated unchanged.
pub struct NodeAdapter<B: NodeBackend> {
    backend: Option<B>,
    mode: AccessMode,
}

impl<B: NodeBackend> NodeAdapter<B> {
    pub fn new(backend: B, mode: AccessMode) -> Self {
        Self {
            backend: Some(backend),
            mode,
        }
    }

    /// An adapter without connection configuration. Reads report lost and
    /// writes are skipped.
    pub fn uninitialized() -> Self {
        Self {
            backend: None,
            mode: AccessMode::default(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    fn readable(&self) -> Result<&B, Refusal> {
        let backend = self.backend.as_ref().ok_or(Refusal::Uninitialized)?;
        if !self.mode.allows_get() {
            return Err(Refusal::ModeDenied);
        }
        Ok(backend)
    }

    fn writable(&self) -> Result<&B, Refusal> {
        let backend = self.backend.as_ref().ok_or(Refusal::Uninitialized)?;
        if !self.mode.allows_put() {
            return Err(Refusal::ModeDenied);
        }
        Ok(backend)
    }
}

#[async_trait]
impl<B: NodeBackend> NodeStore for NodeAdapter<B> {
    async fn get(&self, key: &NodeKey) -> Result<Node, StoreError> {
        let backend = match self.readable() {
            Ok(b) => b,
            Err(refusal) => {
                debug!(key = %key, reason = refusal.as_str(), "get refused");
                return Err(StoreError::Lost(LostReason::Refused(refusal)));
            }
        };
        match backend.find(key).await {
            Ok(Some(node)) => {
                debug!(key = %key, fields = node.len(), "get ok");
                Ok(node)
            }
            Ok(None) => {
                debug!(key = %key, "get miss");
                Err(StoreError::Lost(LostReason::NotFound))
            }
            Err(e) => {
                error!(key = %key, err = %e, "get failed");
                Err(e)
            }
        }
    }

    async fn put(&self, key: &NodeKey, node: Node) -> Result<PutOutcome, StoreError> {
        let backend = match self.writable() {
            Ok(b) => b,
            Err(refusal) => {
                debug!(key = %key, reason = refusal.as_str(), "put skipped");
                return Ok(PutOutcome::Skipped(refusal));
            }
        };
        let fields = node.len();
        match backend.merge_upsert(key, node).await {
            Ok(()) => {
                debug!(key = %key, fields, "put ok");
                Ok(PutOutcome::Written)
            }
            Err(e) => {
                error!(key = %key, err = %e, "put failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::InMemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    fn node(v: serde_json::Value) -> Node {
        Node::from_value(v).unwrap()
    }

    struct FailingBackend;

    #[async_trait]
    impl NodeBackend for FailingBackend {
        async fn find(&self, _key: &NodeKey) -> Result<Option<Node>, StoreError> {
            Err(StoreError::Internal("connection refused".into()))
        }

        async fn merge_upsert(&self, _key: &NodeKey, _node: Node) -> Result<(), StoreError> {
            Err(StoreError::Internal("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn uninitialized_get_is_lost() {
        let adapter: NodeAdapter<InMemoryBackend> = NodeAdapter::uninitialized();
        assert!(!adapter.is_initialized());
        let err = adapter.get(&NodeKey::new("any")).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Lost(LostReason::Refused(Refusal::Uninitialized))
        );
    }

    #[tokio::test]
    async fn uninitialized_put_is_skipped() {
        let adapter: NodeAdapter<InMemoryBackend> = NodeAdapter::uninitialized();
        let out = adapter
            .put(&NodeKey::new("k"), node(json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(out, PutOutcome::Skipped(Refusal::Uninitialized));
    }

    #[tokio::test]
    async fn get_mode_skips_put_and_leaves_store_unchanged() {
        let adapter = NodeAdapter::new(InMemoryBackend::new(), AccessMode::Get);
        let out = adapter
            .put(&NodeKey::new("k"), node(json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(out, PutOutcome::Skipped(Refusal::ModeDenied));
        let backend = adapter.backend().unwrap();
        assert!(backend.is_empty());
        assert_eq!(backend.operations(), 0);
    }

    #[tokio::test]
    async fn put_mode_reports_lost_regardless_of_contents() {
        let backend = InMemoryBackend::new();
        backend.insert(&NodeKey::new("k"), node(json!({"a": 1})));
        let adapter = NodeAdapter::new(backend, AccessMode::Put);
        let err = adapter.get(&NodeKey::new("k")).await.unwrap_err();
        assert_eq!(err, StoreError::Lost(LostReason::Refused(Refusal::ModeDenied)));
        assert_eq!(adapter.backend().unwrap().operations(), 0);
    }

    #[tokio::test]
    async fn successive_puts_merge() {
        let adapter = NodeAdapter::new(InMemoryBackend::new(), AccessMode::All);
        let key = NodeKey::new("k");
        adapter.put(&key, node(json!({"a": 1}))).await.unwrap();
        adapter.put(&key, node(json!({"b": 2}))).await.unwrap();
        let got = adapter.get(&key).await.unwrap();
        assert_eq!(got.into_value(), json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn never_written_key_is_lost_not_internal() {
        let adapter = NodeAdapter::new(InMemoryBackend::new(), AccessMode::All);
        let err = adapter.get(&NodeKey::new("missing")).await.unwrap_err();
        assert_eq!(err, StoreError::Lost(LostReason::NotFound));
    }

    #[tokio::test]
    async fn backend_failures_surface_as_internal() {
        let adapter = NodeAdapter::new(FailingBackend, AccessMode::All);
        let key = NodeKey::new("k");
        assert!(matches!(
            adapter.get(&key).await,
            Err(StoreError::Internal(_))
        ));
        assert!(matches!(
            adapter.put(&key, Node::new()).await,
            Err(StoreError::Internal(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_puts_end_in_an_allowed_state() {
        let adapter = Arc::new(NodeAdapter::new(InMemoryBackend::new(), AccessMode::All));
        let key = NodeKey::new("race");

        let a = {
            let adapter = Arc::clone(&adapter);
            let key = key.clone();
            tokio::spawn(async move { adapter.put(&key, node(json!({"a": 1}))).await })
        };
        let b = {
            let adapter = Arc::clone(&adapter);
            let key = key.clone();
            tokio::spawn(async move { adapter.put(&key, node(json!({"b": 2}))).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let got = adapter.get(&key).await.unwrap().into_value();
        let allowed = [json!({"a": 1}), json!({"b": 2}), json!({"a": 1, "b": 2})];
        assert!(allowed.contains(&got), "unexpected final node: {got}");
    }
}
