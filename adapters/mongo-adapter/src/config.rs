//! Connection options intake.
//!
//! The host hands over an options object once at startup. A `mongo`
//! sub-object turns the adapter on; its fields are defaulted and validated
//! into an immutable [`MongoConfig`]. Malformed values are rejected here
//! instead of being spliced into the connection string.

use domain::AccessMode;
use serde::Deserialize;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 27017;
pub const DEFAULT_DATABASE: &str = "gun";
pub const DEFAULT_COLLECTION: &str = "gun-mongo";

/// Options object supplied by the host.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct HostOptions {
    #[serde(default)]
    pub mongo: Option<MongoOptions>,
}

/// Raw `mongo` options as the host supplies them. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoOptions {
    pub host: Option<String>,
    pub port: Option<PortOption>,
    pub database: Option<String>,
    pub query: Option<String>,
    pub collection: Option<String>,
    pub way: Option<String>,
    pub index_in_background: Option<bool>,
}

/// Hosts pass the port either as a number or as a string.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortOption {
    Number(u64),
    Text(String),
}

impl MongoOptions {
    /// Read options from `MONGO_*` environment variables.
    ///
    /// - `MONGO_HOST`, `MONGO_PORT`, `MONGO_DATABASE`, `MONGO_QUERY`
    /// - `MONGO_COLLECTION`, `MONGO_WAY` (`get` | `put` | `all`)
    /// - `MONGO_INDEX_IN_BACKGROUND` (`1` | `true` | `yes`)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`MongoOptions::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|s| !s.is_empty());
        Self {
            host: var("MONGO_HOST"),
            port: var("MONGO_PORT").map(PortOption::Text),
            database: var("MONGO_DATABASE"),
            query: var("MONGO_QUERY"),
            collection: var("MONGO_COLLECTION"),
            way: var("MONGO_WAY"),
            index_in_background: var("MONGO_INDEX_IN_BACKGROUND")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")),
        }
    }
}

/// Rejected option value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid mongo.{field}: {message}")]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl ConfigError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validated connection configuration. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MongoConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub query: Option<String>,
    pub collection: String,
    pub mode: AccessMode,
    pub index_in_background: bool,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.into(),
            query: None,
            collection: DEFAULT_COLLECTION.into(),
            mode: AccessMode::All,
            index_in_background: false,
        }
    }
}

impl MongoConfig {
    /// Apply defaults and validate. Empty strings and port `0` count as unset.
    pub fn from_options(opts: &MongoOptions) -> Result<Self, ConfigError> {
        let host = non_empty(&opts.host).unwrap_or(DEFAULT_HOST);
        if host.chars().any(|c| matches!(c, '/' | '?' | '@' | '#') || c.is_whitespace()) {
            return Err(ConfigError::new("host", format!("'{host}' is not a host name")));
        }

        let port = match &opts.port {
            None => DEFAULT_PORT,
            Some(p) => parse_port(p)?,
        };

        let database = non_empty(&opts.database).unwrap_or(DEFAULT_DATABASE);
        if database
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '.' | '"' | '$' | '\0') || c.is_whitespace())
        {
            return Err(ConfigError::new(
                "database",
                format!("'{database}' contains characters not allowed in a database name"),
            ));
        }

        let query = non_empty(&opts.query);
        if let Some(q) = query {
            if q.starts_with('?') {
                return Err(ConfigError::new("query", "must not start with '?'"));
            }
            if q.chars().any(|c| c == '#' || c.is_whitespace()) {
                return Err(ConfigError::new("query", format!("'{q}' is not a query string")));
            }
        }

        let collection = non_empty(&opts.collection).unwrap_or(DEFAULT_COLLECTION);
        if collection.contains('$') || collection.contains('\0') {
            return Err(ConfigError::new(
                "collection",
                format!("'{collection}' contains characters not allowed in a collection name"),
            ));
        }

        let mode = match non_empty(&opts.way) {
            None => AccessMode::All,
            Some(w) => AccessMode::parse(w).ok_or_else(|| {
                ConfigError::new("way", format!("'{w}' is not one of get, put, all"))
            })?,
        };

        Ok(Self {
            host: host.to_string(),
            port,
            database: database.to_string(),
            query: query.map(str::to_string),
            collection: collection.to_string(),
            mode,
            index_in_background: opts.index_in_background.unwrap_or(false),
        })
    }

    /// `mongodb://host:port/database[?query]`
    pub fn connection_uri(&self) -> String {
        let mut uri = format!("mongodb://{}:{}/{}", self.host, self.port, self.database);
        if let Some(q) = &self.query {
            uri.push('?');
            uri.push_str(q);
        }
        uri
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn parse_port(port: &PortOption) -> Result<u16, ConfigError> {
    let n = match port {
        PortOption::Number(n) => *n,
        PortOption::Text(s) if s.is_empty() => return Ok(DEFAULT_PORT),
        PortOption::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::new("port", format!("'{s}' is not a number")))?,
    };
    match n {
        0 => Ok(DEFAULT_PORT),
        n => u16::try_from(n)
            .map_err(|_| ConfigError::new("port", format!("{n} is out of range"))),
    }
}
