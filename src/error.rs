//! Error types for db-session.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Variants are split into setup-time failures (configuration, connecting) and
//! query-time failures. None of them are fatal to the process; callers decide.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Broad classification of a [`DbError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised while loading configuration or opening a data source.
    Setup,
    /// Raised while running a statement or reading its results.
    Query,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to load configuration from {}: {message}", path.display())]
    ConfigLoad { path: PathBuf, message: String },

    #[error("Data source '{data_source}' is not configured: {message}")]
    Configuration {
        data_source: String,
        message: String,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Failed to decode column '{column}': {message}")]
    Decode { column: String, message: String },

    #[error("Timeout: {operation} exceeded {limit:?}")]
    Timeout { operation: String, limit: Duration },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration loading error.
    pub fn config_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an error for a data source that is missing or badly defined.
    pub fn configuration(data_source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            data_source: data_source.into(),
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error happened while setting up, or while querying.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigLoad { .. } | Self::Configuration { .. } | Self::Connection { .. } => {
                ErrorKind::Setup
            }
            Self::Query { .. } | Self::Decode { .. } | Self::Timeout { .. } | Self::Internal { .. } => {
                ErrorKind::Query
            }
        }
    }

    pub fn is_setup_error(&self) -> bool {
        self.kind() == ErrorKind::Setup
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Query { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::query(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::query(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "Raise max_connections or acquire_timeout_secs for this data source",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Request a new session")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::decode(col, "column not found"),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::decode(
                index.to_string(),
                format!("index out of bounds (len: {})", len),
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::decode(index, source.to_string())
            }
            sqlx::Error::Decode(source) => DbError::decode("?", source.to_string()),
            sqlx::Error::TypeNotFound { type_name } => DbError::query(
                format!("Type not found: {}", type_name),
                None,
                "Check the types referenced by the statement",
            ),
            sqlx::Error::AnyDriverError(err) => DbError::connection(
                format!("Driver error: {}", err),
                "Check database driver configuration",
            ),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_configuration_error_names_data_source() {
        let err = DbError::configuration("secondary", "no [database.secondary] table");
        assert!(err.to_string().contains("'secondary'"));
        assert!(err.is_setup_error());
    }

    #[test]
    fn test_config_load_display_includes_path() {
        let err = DbError::config_load("/etc/app/config/database.toml", "not found");
        let msg = err.to_string();
        assert!(msg.contains("/etc/app/config/database.toml"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(DbError::config_load("x", "y").kind(), ErrorKind::Setup);
        assert_eq!(DbError::connection("x", "y").kind(), ErrorKind::Setup);
        assert_eq!(DbError::query("x", None, "y").kind(), ErrorKind::Query);
        assert_eq!(DbError::decode("c", "bad").kind(), ErrorKind::Query);
        assert_eq!(
            DbError::timeout("select", Duration::from_secs(1)).kind(),
            ErrorKind::Query
        );
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::query(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(DbError::internal("boom").suggestion(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", Duration::from_secs(30)).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::configuration("db", "missing").is_retryable());
    }

    #[test]
    fn test_pool_closed_maps_to_connection() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::Connection { .. }));
    }

    #[test]
    fn test_row_not_found_maps_to_query() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::Query { .. }));
        assert_eq!(err.kind(), ErrorKind::Query);
    }
}
