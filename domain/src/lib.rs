//! Domain library for gun-mongo.
//!
//! Holds the node model, the access mode, the storage ports (traits) and the
//! error definitions. Database drivers and IO concerns stay out of this crate;
//! they live in adapter crates that implement [`NodeBackend`].

use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque identifier of a node. Stored as the document `_id`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey(String);

impl NodeKey {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A node document: field name to JSON value, no schema.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Node(Map<String, Value>);

impl Node {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Returns `None` unless the value is a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Merge `incoming` over this node; see [`merge::deep_merge`].
    pub fn merge(&mut self, incoming: Node) {
        merge::deep_merge(&mut self.0, incoming.0);
    }
}

impl From<Map<String, Value>> for Node {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Which operations an adapter permits (the host's `way` option).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccessMode {
    /// Reads only; writes are skipped.
    Get,
    /// Writes only; reads report lost.
    Put,
    /// Reads and writes.
    #[default]
    All,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Get => "get",
            AccessMode::Put => "put",
            AccessMode::All => "all",
        }
    }

    /// Exact, lowercase match only.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "get" => Some(AccessMode::Get),
            "put" => Some(AccessMode::Put),
            "all" => Some(AccessMode::All),
            _ => None,
        }
    }

    pub fn allows_get(&self) -> bool {
        matches!(self, AccessMode::Get | AccessMode::All)
    }

    pub fn allows_put(&self) -> bool {
        matches!(self, AccessMode::Put | AccessMode::All)
    }
}

impl Display for AccessMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an adapter declined to touch storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refusal {
    /// No connection configuration was supplied.
    Uninitialized,
    /// The configured access mode forbids the operation.
    ModeDenied,
}

impl Refusal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Refusal::Uninitialized => "uninitialized",
            Refusal::ModeDenied => "mode_denied",
        }
    }
}

/// Detail behind a "lost" result. The host sees one kind; callers that care
/// can still tell a missing document from a refused read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LostReason {
    NotFound,
    Refused(Refusal),
}

impl Display for LostReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LostReason::NotFound => f.write_str("not found"),
            LostReason::Refused(r) => write!(f, "refused ({})", r.as_str()),
        }
    }
}

/// Errors surfaced to the host.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Driver or backend failure.
    #[error("internal storage error: {0}")]
    Internal(String),
    /// Nothing to return: missing document, uninitialized adapter or mode mismatch.
    #[error("node lost: {0}")]
    Lost(LostReason),
}

impl StoreError {
    /// Wire code of the error kind, `"internal"` or `"lost"`.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Internal(_) => "internal",
            StoreError::Lost(_) => "lost",
        }
    }
}

/// Result of a `put` that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    Skipped(Refusal),
}

/// Storage port implemented by database adapters.
///
/// Backends see every call that passed the adapter's gating and nothing else.
#[async_trait]
pub trait NodeBackend: Send + Sync {
    /// Load the document stored at `key`, if any.
    async fn find(&self, key: &NodeKey) -> Result<Option<Node>, StoreError>;

    /// Merge `node` over the document at `key`, inserting it when absent.
    async fn merge_upsert(&self, key: &NodeKey, node: Node) -> Result<(), StoreError>;
}

/// Storage contract exposed to the host. Each call resolves exactly once.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn get(&self, key: &NodeKey) -> Result<Node, StoreError>;
    async fn put(&self, key: &NodeKey, node: Node) -> Result<PutOutcome, StoreError>;
}

/// Return a short about/version line for binaries to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{}", pkg, ver)
}

pub mod adapters;
pub mod merge;
pub mod service;
