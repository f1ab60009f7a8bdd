//! node-server — HTTP host for the gun-mongo node store.
//!
//! Exposes the storage contract over HTTP so a graph peer (or curl) can read
//! and merge nodes:
//! - `GET /nodes/:key` returns the stored node, 404 `lost` when it is missing
//!   or the store refuses reads.
//! - `PUT /nodes/:key` merges a JSON object into the node; 204 when written,
//!   202 when the store skipped the write.
//!
//! Run:
//! ```bash
//! # MongoDB on localhost, pretty logs; PORT optional
//! cargo run -p node-server
//!
//! # in-memory store, json logs
//! STORAGE_PROVIDER=memory LOG_FORMAT=json cargo run -p node-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use domain::adapters::memory_store::InMemoryBackend;
use domain::service::NodeAdapter;
use domain::{AccessMode, Node, NodeKey, NodeStore, PutOutcome, StoreError};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn NodeStore>,
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_degraded();

    let store = match build_store(&cfg).await {
        Ok(s) => s,
        Err(e) => {
            error!(err = %e, "node store init failed");
            std::process::exit(1);
        }
    };

    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let app = routes(AppState { store })
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "bind failed");
            std::process::exit(1);
        }
    };
    info!(%addr, version = %domain::about(), "node-server listening");
    if let Err(e) = axum::serve(listener, app).await {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct the node store selected by config and feature flags.
async fn build_store(cfg: &config::Config) -> Result<Arc<dyn NodeStore>, String> {
    match cfg.storage_provider {
        config::StorageProvider::Memory => Ok(Arc::new(NodeAdapter::new(
            InMemoryBackend::new(),
            AccessMode::All,
        ))),
        config::StorageProvider::Disabled => {
            Ok(Arc::new(NodeAdapter::<InMemoryBackend>::uninitialized()))
        }
        #[cfg(feature = "mongo")]
        config::StorageProvider::Mongo => {
            let options = mongo_adapter::HostOptions {
                mongo: Some(cfg.mongo.clone()),
            };
            let store = mongo_adapter::open(&options)
                .await
                .map_err(|e| e.to_string())?;
            if let Some(backend) = store.backend() {
                if let Err(e) = backend.ensure_index().await {
                    warn!(err = %e, "index check failed; continuing");
                }
            }
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mongo"))]
        config::StorageProvider::Mongo => Err("built without the `mongo` feature".into()),
    }
}

fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/nodes/:key", get(get_node).put(put_node))
        .with_state(state)
}

/// Create a structured error JSON with a default message based on the code.
///
/// Returns: `{"error": {"code": "<code>", "message": "<default message>"}}`
fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "lost" => "Node not found or store unavailable",
        "internal" => "Internal storage error",
        _ => code,
    };
    serde_json::json!({"error": {"code": code, "message": message}})
}

fn store_error_response(key: &NodeKey, e: StoreError) -> Response {
    match e {
        StoreError::Lost(reason) => {
            warn!(key = %key, %reason, "node lost");
            (StatusCode::NOT_FOUND, Json(json_err(e.code()))).into_response()
        }
        StoreError::Internal(ref msg) => {
            error!(key = %key, err = %msg, "store error");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json_err(e.code()))).into_response()
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn get_node(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    let key = NodeKey::new(key);
    match state.store.get(&key).await {
        Ok(node) => Json(node).into_response(),
        Err(e) => store_error_response(&key, e),
    }
}

async fn put_node(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(node): Json<Node>,
) -> Response {
    let key = NodeKey::new(key);
    match state.store.put(&key, node).await {
        Ok(PutOutcome::Written) => {
            info!(key = %key, "put ok");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(PutOutcome::Skipped(reason)) => {
            warn!(key = %key, reason = reason.as_str(), "put skipped");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({"status": "skipped", "reason": reason.as_str()})),
            )
                .into_response()
        }
        Err(e) => store_error_response(&key, e),
    }
}
