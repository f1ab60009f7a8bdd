//! MongoDB adapter implementing the `NodeBackend` port.
//!
//! - Stores each node as one document in the configured collection, keyed by
//!   `_id` = node key.
//! - Merges writes server-side with a single upserting `$set` of dotted paths,
//!   so concurrent writers to one node do not drop each other's fields.
//!   Shapes `$set` cannot express go through read/merge/replace instead.
//! - [`open`] turns the host options object into a ready adapter; without a
//!   `mongo` section the adapter stays uninitialized and never touches the
//!   database.
//!
//! Notes:
//! - The driver connects lazily; `open` does not wait for the server.
//! - `ensure_index` is not on the request path. Hosts call it once at startup.

use std::sync::Arc;

use async_trait::async_trait;
use domain::service::NodeAdapter;
use domain::{Node, NodeBackend, NodeKey, StoreError};
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::{Client, Collection, IndexModel};
use tracing::{debug, info, warn};

pub mod config;
mod document;

pub use config::{ConfigError, HostOptions, MongoConfig, MongoOptions, PortOption};

use document::{document_to_node, key_filter, node_to_document, set_paths, SetPlan, ID_FIELD};

/// Server error code for a `$set` path blocked by an existing non-object value.
const PATH_NOT_VIABLE: i32 = 28;

/// Host-facing store backed by MongoDB.
pub type MongoNodeStore = NodeAdapter<MongoBackend>;

/// Failure to build an adapter from host options.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("mongodb client init: {0}")]
    Connect(String),
}

/// Build an adapter from the host options object.
///
/// Missing `mongo` options yield an uninitialized adapter rather than an
/// error, so a host without a database keeps running with reads reporting
/// lost and writes skipped.
pub async fn open(options: &HostOptions) -> Result<MongoNodeStore, OpenError> {
    let Some(mongo) = &options.mongo else {
        warn!("no mongo options supplied; node store stays uninitialized");
        return Ok(NodeAdapter::uninitialized());
    };
    let config = MongoConfig::from_options(mongo)?;
    let mode = config.mode;
    info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        collection = %config.collection,
        mode = %mode,
        "mongo node store configured"
    );
    let backend = MongoBackend::connect(config).await?;
    Ok(NodeAdapter::new(backend, mode))
}

/// Node backend over one MongoDB collection.
#[derive(Clone)]
pub struct MongoBackend {
    client: Client,
    config: Arc<MongoConfig>,
}

impl MongoBackend {
    /// Create a client for the configured connection string.
    pub async fn connect(config: MongoConfig) -> Result<Self, OpenError> {
        let client = Client::with_uri_str(config.connection_uri())
            .await
            .map_err(|e| OpenError::Connect(e.to_string()))?;
        Ok(Self::with_client(client, config))
    }

    /// Use an existing driver client.
    pub fn with_client(client: Client, config: MongoConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &MongoConfig {
        &self.config
    }

    /// The configured collection. Same database and name on every call.
    pub fn collection(&self) -> Collection<Document> {
        self.client
            .database(&self.config.database)
            .collection(&self.config.collection)
    }

    /// Ensure the ascending `_id` index exists. `_id` is unique by
    /// construction; the server refuses an explicit `unique` option on it.
    ///
    /// `indexInBackground` is accepted in the options but has no effect:
    /// current servers ignore the `background` index option.
    pub async fn ensure_index(&self) -> Result<(), StoreError> {
        let index = IndexModel::builder().keys(doc! { "_id": 1 }).build();
        self.collection()
            .create_index(index)
            .await
            .map_err(map_mongo_err)?;
        debug!(collection = %self.config.collection, "index ensured");
        Ok(())
    }

    /// Client-side merge for nodes `$set` cannot express. Not atomic: a
    /// concurrent writer between the read and the replace can be lost.
    async fn read_merge_replace(&self, key: &NodeKey, mut node: Node) -> Result<(), StoreError> {
        node.remove(ID_FIELD);
        let coll = self.collection();
        let mut merged = coll
            .find_one(key_filter(key))
            .await
            .map_err(map_mongo_err)?
            .map(document_to_node)
            .unwrap_or_default();
        merged.merge(node);
        coll.replace_one(key_filter(key), node_to_document(&merged)?)
            .upsert(true)
            .await
            .map_err(map_mongo_err)?;
        Ok(())
    }
}

#[async_trait]
impl NodeBackend for MongoBackend {
    async fn find(&self, key: &NodeKey) -> Result<Option<Node>, StoreError> {
        let found = self
            .collection()
            .find_one(key_filter(key))
            .await
            .map_err(map_mongo_err)?;
        Ok(found.map(document_to_node))
    }

    async fn merge_upsert(&self, key: &NodeKey, node: Node) -> Result<(), StoreError> {
        let set = match set_paths(&node)? {
            SetPlan::Paths(set) => set,
            SetPlan::ReadMerge => {
                debug!(key = %key, "node needs client-side merge");
                return self.read_merge_replace(key, node).await;
            }
        };
        let result = self
            .collection()
            .update_one(key_filter(key), doc! { "$set": set })
            .upsert(true)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_path_conflict(&e) => {
                warn!(key = %key, err = %e, "$set path blocked; merging client-side");
                self.read_merge_replace(key, node).await
            }
            Err(e) => Err(map_mongo_err(e)),
        }
    }
}

fn is_path_conflict(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == PATH_NOT_VIABLE
    )
}

fn map_mongo_err(e: mongodb::error::Error) -> StoreError {
    StoreError::Internal(format!("mongodb: {e}"))
}
