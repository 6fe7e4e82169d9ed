//! Configuration handling for db-session.
//!
//! Data sources are declared in `<config dir>/database.toml`:
//!
//! ```toml
//! [database.primary]
//! dsn = "user:pass@tcp(db.internal:3306)/app"
//! max_connections = 20
//!
//! [database.reports]
//! dsn = "postgres://reader@reports.internal/reports"
//! lazy = true
//! ```
//!
//! The config directory is an explicit override, else `$DB_SESSION_CONFIG_DIR`
//! (through [`ConfigSource::from_env`]), else `<cwd>/config`. The file is read
//! at most once per [`ConfigSource`].

use crate::db::dsn::Dsn;
use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Environment variable naming the config directory.
pub const CONFIG_DIR_ENV: &str = "DB_SESSION_CONFIG_DIR";
pub const CONFIG_FILE_NAME: &str = "database.toml";
pub const DEFAULT_CONFIG_DIR_NAME: &str = "config";

/// Top-level table holding one sub-table per data source.
pub const DATABASE_TABLE: &str = "database";

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Per-pool deadline used by `SessionRegistry::close_all`.
pub const DEFAULT_CLOSE_TIMEOUT_SECS: u64 = 30;

/// Connection pool options read from a `[database.<name>]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10 for MySQL/PostgreSQL, 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum idle connections kept open (default: 0)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
    /// Open the pool without establishing a connection (default: false)
    pub lazy: Option<bool>,
    /// Deadline for each operation on a handle, 0 disables (default: 30)
    pub query_timeout_secs: Option<u64>,
}

impl PoolOptions {
    /// Keys accepted next to `dsn` in a data source table.
    pub const KEYS: &'static [&'static str] = &[
        "max_connections",
        "min_connections",
        "idle_timeout_secs",
        "acquire_timeout_secs",
        "test_before_acquire",
        "lazy",
        "query_timeout_secs",
    ];

    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    /// Get min_connections with default value.
    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    /// Get idle_timeout with default value.
    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    /// Get test_before_acquire with default value.
    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    pub fn lazy_or_default(&self) -> bool {
        self.lazy.unwrap_or(false)
    }

    /// The per-operation deadline, or `None` when disabled with `query_timeout_secs = 0`.
    pub fn query_timeout(&self) -> Option<Duration> {
        match self.query_timeout_secs.unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self, db_type: DatabaseType) -> Result<(), String> {
        if self.max_connections == Some(0) {
            return Err("max_connections must be greater than 0".to_string());
        }
        let max = self.max_connections_or_default(db_type == DatabaseType::SQLite);
        let min = self.min_connections_or_default();
        if min > max {
            return Err(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                min, max
            ));
        }
        Ok(())
    }
}

/// A fully validated data source definition.
#[derive(Debug, Clone)]
pub struct DataSourceConfig {
    pub name: String,
    pub dsn: Dsn,
    pub pool_options: PoolOptions,
}

impl DataSourceConfig {
    pub fn db_type(&self) -> DatabaseType {
        self.dsn.db_type()
    }
}

/// The parsed contents of `database.toml`. Immutable once built.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    root: toml::Table,
    origin: PathBuf,
}

impl ConfigTree {
    /// Parse TOML text; `origin` is only used in error messages.
    pub fn parse(text: &str, origin: impl Into<PathBuf>) -> DbResult<Self> {
        let origin = origin.into();
        let root = text
            .parse::<toml::Table>()
            .map_err(|e| DbError::config_load(&origin, e.to_string()))?;
        Ok(Self { root, origin })
    }

    /// The file this tree was loaded from.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Look up a value by dotted path, e.g. `database.primary.dsn`.
    pub fn get(&self, path: &str) -> Option<&toml::Value> {
        let mut segments = path.split('.');
        let mut current = self.root.get(segments.next()?)?;
        for segment in segments {
            current = current.as_table()?.get(segment)?;
        }
        Some(current)
    }

    /// Look up a string by dotted path. Non-string values yield `None`.
    pub fn get_string(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(toml::Value::as_str)
    }

    /// Names of all `[database.<name>]` tables.
    pub fn data_source_names(&self) -> Vec<String> {
        self.root
            .get(DATABASE_TABLE)
            .and_then(toml::Value::as_table)
            .map(|t| {
                t.iter()
                    .filter(|(_, v)| v.is_table())
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve and validate the data source called `name`.
    ///
    /// The `[database.<name>]` table is looked up by key, so names containing
    /// dots must be quoted in the file (`[database."eu.primary"]`).
    pub fn data_source(&self, name: &str) -> DbResult<DataSourceConfig> {
        let table = self
            .root
            .get(DATABASE_TABLE)
            .and_then(toml::Value::as_table)
            .and_then(|t| t.get(name))
            .and_then(toml::Value::as_table)
            .ok_or_else(|| {
                DbError::configuration(
                    name,
                    format!("no [{DATABASE_TABLE}.{name}] table in {}", self.origin.display()),
                )
            })?;

        let raw_dsn = match table.get("dsn") {
            Some(toml::Value::String(s)) if !s.trim().is_empty() => s.as_str(),
            Some(toml::Value::String(_)) => {
                return Err(DbError::configuration(name, "dsn is empty"));
            }
            Some(other) => {
                return Err(DbError::configuration(
                    name,
                    format!("dsn must be a string, found {}", other.type_str()),
                ));
            }
            None => return Err(DbError::configuration(name, "dsn is not set")),
        };
        let dsn = Dsn::parse(raw_dsn).map_err(|e| DbError::configuration(name, e.to_string()))?;

        let mut options = table.clone();
        options.remove("dsn");
        for key in options.keys() {
            if !PoolOptions::KEYS.contains(&key.as_str()) {
                warn!(data_source = name, key = %key, "Ignoring unknown data source option");
            }
        }
        let pool_options: PoolOptions = toml::Value::Table(options)
            .try_into()
            .map_err(|e: toml::de::Error| {
                DbError::configuration(name, format!("invalid pool options: {}", e.message()))
            })?;
        pool_options
            .validate(dsn.db_type())
            .map_err(|e| DbError::configuration(name, e))?;

        Ok(DataSourceConfig {
            name: name.to_string(),
            dsn,
            pool_options,
        })
    }
}

/// Locates `database.toml` and loads it once.
#[derive(Debug)]
pub struct ConfigSource {
    dir: PathBuf,
    tree: OnceCell<Arc<ConfigTree>>,
}

impl ConfigSource {
    /// Return the override if non-empty, else `<cwd>/config`.
    pub fn resolve_path(explicit: Option<&Path>) -> DbResult<PathBuf> {
        match explicit {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(dir.to_path_buf()),
            _ => {
                let cwd = std::env::current_dir().map_err(|e| {
                    DbError::config_load(DEFAULT_CONFIG_DIR_NAME, format!("cannot read working directory: {e}"))
                })?;
                Ok(cwd.join(DEFAULT_CONFIG_DIR_NAME))
            }
        }
    }

    pub fn new(explicit: Option<&Path>) -> DbResult<Self> {
        let dir = Self::resolve_path(explicit)?;
        debug!(dir = %dir.display(), "Resolved config directory");
        Ok(Self {
            dir,
            tree: OnceCell::new(),
        })
    }

    /// Like [`ConfigSource::new`], with the override taken from `$DB_SESSION_CONFIG_DIR`.
    pub fn from_env() -> DbResult<Self> {
        let explicit = std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from);
        Self::new(explicit.as_deref())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE_NAME)
    }

    /// Load `database.toml`, reading the file only on the first successful call.
    ///
    /// Concurrent callers wait for a single read. A failed load is not cached.
    pub async fn load(&self) -> DbResult<Arc<ConfigTree>> {
        self.tree
            .get_or_try_init(|| async {
                let path = self.file_path();
                let text = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| DbError::config_load(&path, e.to_string()))?;
                let tree = ConfigTree::parse(&text, &path)?;
                debug!(
                    path = %path.display(),
                    data_sources = tree.data_source_names().len(),
                    "Loaded database configuration"
                );
                Ok::<_, DbError>(Arc::new(tree))
            })
            .await
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.tree.initialized()
    }
}
