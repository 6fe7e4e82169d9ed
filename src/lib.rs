//! Named database sessions with a string-row decoder.
//!
//! A [`SessionRegistry`] maps data-source names from `database.toml` to shared
//! connection pools, opening each on first use. [`ConnectionHandle::select`]
//! turns any result set into ordered `column -> string` rows.
//!
//! ```no_run
//! # async fn demo() -> db_session::DbResult<()> {
//! let registry = db_session::open_registry(None).await?;
//! let handle = registry.get("primary").await?;
//! let rows = handle.select("SELECT id, name FROM users", &[]).await?;
//! for row in &rows {
//!     println!("{} {}", row["id"], row["name"]);
//! }
//! registry.close_all().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod telemetry;

pub use config::{ConfigSource, ConfigTree, DataSourceConfig, PoolOptions};
pub use db::{
    CloseReport, ConnectionHandle, Connector, DbPool, DbRow, DbTransaction, Dsn,
    PreparedStatement, RowStream, SessionRegistry, SqlxConnector,
};
pub use error::{DbError, DbResult, ErrorKind};
pub use models::{DatabaseType, DecodedRow, ExecResult, QueryParam};

use std::path::Path;

/// Resolve the config directory, load `database.toml` and build a registry.
///
/// `dir` overrides the directory; `None` falls back to `<cwd>/config`.
pub async fn open_registry(dir: Option<&Path>) -> DbResult<SessionRegistry> {
    let source = ConfigSource::new(dir)?;
    let tree = source.load().await?;
    Ok(SessionRegistry::new(tree))
}
