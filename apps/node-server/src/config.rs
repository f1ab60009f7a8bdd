//! Centralized configuration for node-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use std::env;
use std::fmt;

#[cfg(feature = "mongo")]
use mongo_adapter::{MongoConfig, MongoOptions};

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// MongoDB via the mongo adapter
    Mongo,
    /// In-memory storage (data lost on restart)
    Memory,
    /// No storage configured: reads report lost, writes are skipped
    Disabled,
}

impl StorageProvider {
    fn from_str(s: &str) -> Result<Self, ConfigError> {
        if s.eq_ignore_ascii_case("mongo") {
            Ok(Self::Mongo)
        } else if s.eq_ignore_ascii_case("memory") {
            Ok(Self::Memory)
        } else if s.eq_ignore_ascii_case("none") {
            Ok(Self::Disabled)
        } else {
            Err(ConfigError {
                field: "STORAGE_PROVIDER",
                message: format!("'{s}' is not one of mongo, memory, none"),
            })
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug, PartialEq, Eq)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 8765)
    pub port: u16,
    /// Storage provider (default: mongo)
    pub storage_provider: StorageProvider,
    /// MongoDB options from `MONGO_*`, validated when the provider is mongo
    #[cfg(feature = "mongo")]
    pub mongo: MongoOptions,
    /// Log format
    pub log_format: LogFormat,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8765);

        let storage_provider = StorageProvider::from_str(
            &env::var("STORAGE_PROVIDER").unwrap_or_else(|_| "mongo".into()),
        )?;

        let log_format =
            LogFormat::from_str(&env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".into()));

        #[cfg(feature = "mongo")]
        let mongo = MongoOptions::from_env();

        if storage_provider == StorageProvider::Mongo {
            #[cfg(feature = "mongo")]
            MongoConfig::from_options(&mongo).map_err(|e| ConfigError {
                field: mongo_env_name(e.field),
                message: e.message,
            })?;

            #[cfg(not(feature = "mongo"))]
            return Err(ConfigError {
                field: "STORAGE_PROVIDER",
                message: "mongo requires building with the `mongo` feature".into(),
            });
        }

        Ok(Self {
            port,
            storage_provider,
            #[cfg(feature = "mongo")]
            mongo,
            log_format,
        })
    }

    /// Log warnings about configurations that lose or refuse data.
    pub fn warn_if_degraded(&self) {
        match self.storage_provider {
            StorageProvider::Memory => tracing::warn!(
                "STORAGE_PROVIDER=memory: nodes are kept in process memory and lost on restart."
            ),
            StorageProvider::Disabled => tracing::warn!(
                "STORAGE_PROVIDER=none: node store is uninitialized. Every read reports lost \
                 and every write is skipped."
            ),
            StorageProvider::Mongo => {}
        }
    }
}

#[cfg(feature = "mongo")]
fn mongo_env_name(field: &str) -> &'static str {
    match field {
        "host" => "MONGO_HOST",
        "port" => "MONGO_PORT",
        "database" => "MONGO_DATABASE",
        "query" => "MONGO_QUERY",
        "collection" => "MONGO_COLLECTION",
        "way" => "MONGO_WAY",
        _ => "MONGO_*",
    }
}
