//! Live handles to an opened data source.

use crate::config::DEFAULT_QUERY_TIMEOUT_SECS;
use crate::db::decode::DbRow;
use crate::db::executor::{
    self, RowStream, collect_decoded, into_row_stream, stream_with_deadline, with_deadline,
};
use crate::db::pool::DbPool;
use crate::db::statement::PreparedStatement;
use crate::db::transaction::DbTransaction;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, DecodedRow, ExecResult, QueryParam};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// A handle to one opened data source.
///
/// Cloning is cheap and every clone shares the same pool. All operations are
/// safe to call concurrently; the pool hands out connections as needed.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    data_source: Arc<str>,
    pool: DbPool,
    query_timeout: Option<Duration>,
}

impl ConnectionHandle {
    /// Wrap a pool opened for `data_source`.
    pub fn new(data_source: impl Into<Arc<str>>, pool: DbPool) -> Self {
        Self {
            id: Uuid::new_v4(),
            data_source: data_source.into(),
            pool,
            query_timeout: Some(Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS)),
        }
    }

    /// Return a handle sharing this pool with a different per-operation
    /// deadline. `None` disables the deadline.
    pub fn with_query_timeout(&self, query_timeout: Option<Duration>) -> Self {
        Self {
            query_timeout,
            ..self.clone()
        }
    }

    /// Identity of the underlying pool. Clones report the same id; a pool
    /// reopened after a close gets a new one.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Close the pool. Waits for checked-out connections to be returned;
    /// later operations on any clone fail with a connection error.
    pub async fn close(&self) {
        info!(data_source = %self.data_source, id = %self.id, "Closing connection pool");
        self.pool.close().await;
    }

    /// Validate `sql` with the server and return a reusable statement.
    pub async fn prepare(&self, sql: &str) -> DbResult<PreparedStatement> {
        debug!(data_source = %self.data_source, sql = %sql, "Preparing statement");
        let (columns, parameter_count) =
            with_deadline(self.query_timeout, "prepare", async {
                let meta = impl_db_dispatch!(&self.pool, {
                    MySql(pool) => describe(sqlx::Executor::prepare(pool, sql).await?),
                    Postgres(pool) => describe(sqlx::Executor::prepare(pool, sql).await?),
                    SQLite(pool) => describe(sqlx::Executor::prepare(pool, sql).await?),
                });
                Ok::<_, DbError>(meta)
            })
            .await?;
        Ok(PreparedStatement::new(
            self.clone(),
            sql.to_string(),
            columns,
            parameter_count,
        ))
    }

    /// Run a statement that returns no rows.
    pub async fn exec(&self, sql: &str, params: &[QueryParam]) -> DbResult<ExecResult> {
        debug!(data_source = %self.data_source, sql = %sql, params = params.len(), "Executing statement");
        with_deadline(self.query_timeout, "exec", async {
            let result = impl_db_dispatch!(&self.pool, {
                MySql(pool) => executor::mysql::execute(pool, sql, params).await,
                Postgres(pool) => executor::postgres::execute(pool, sql, params).await,
                SQLite(pool) => executor::sqlite::execute(pool, sql, params).await,
            });
            result.map_err(DbError::from)
        })
        .await
    }

    /// Stream the rows of a query without decoding them.
    ///
    /// The deadline applies to each wait for the next row. Dropping the
    /// stream early releases the connection.
    pub fn query<'a>(&'a self, sql: &'a str, params: &'a [QueryParam]) -> RowStream<'a> {
        debug!(data_source = %self.data_source, sql = %sql, params = params.len(), "Streaming query");
        let rows = impl_db_dispatch!(&self.pool, {
            MySql(pool) => into_row_stream(executor::mysql::fetch(pool, sql, params)),
            Postgres(pool) => into_row_stream(executor::postgres::fetch(pool, sql, params)),
            SQLite(pool) => into_row_stream(executor::sqlite::fetch(pool, sql, params)),
        });
        stream_with_deadline(rows, self.query_timeout)
    }

    /// Fetch at most one row; further rows are discarded.
    pub async fn query_row(&self, sql: &str, params: &[QueryParam]) -> DbResult<Option<DbRow>> {
        debug!(data_source = %self.data_source, sql = %sql, params = params.len(), "Fetching single row");
        with_deadline(self.query_timeout, "query_row", async {
            let row = impl_db_dispatch!(&self.pool, {
                MySql(pool) => executor::mysql::fetch_optional(pool, sql, params)
                    .await
                    .map(|r| r.map(DbRow::from)),
                Postgres(pool) => executor::postgres::fetch_optional(pool, sql, params)
                    .await
                    .map(|r| r.map(DbRow::from)),
                SQLite(pool) => executor::sqlite::fetch_optional(pool, sql, params)
                    .await
                    .map(|r| r.map(DbRow::from)),
            });
            row.map_err(DbError::from)
        })
        .await
    }

    /// Start a transaction on a dedicated connection.
    pub async fn begin(&self) -> DbResult<DbTransaction> {
        debug!(data_source = %self.data_source, "Beginning transaction");
        let name = &*self.data_source;
        let timeout = self.query_timeout;
        with_deadline(timeout, "begin", async {
            let tx = match &self.pool {
                DbPool::MySql(pool) => DbTransaction::mysql(pool.begin().await?, name, timeout),
                DbPool::Postgres(pool) => {
                    DbTransaction::postgres(pool.begin().await?, name, timeout)
                }
                DbPool::SQLite(pool) => DbTransaction::sqlite(pool.begin().await?, name, timeout),
            };
            Ok::<_, DbError>(tx)
        })
        .await
    }

    /// Run a query and decode every row into a column-name to string map.
    ///
    /// Rows come back in result order and each map keeps the result's column
    /// order. SQL NULL becomes the empty string, so NULL and `''` are
    /// indistinguishable here; use [`query`](Self::query) when that matters.
    /// Any error, including one part way through the result set, discards the
    /// rows decoded so far. Zero rows yields an empty vector.
    pub async fn select(&self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<DecodedRow>> {
        debug!(data_source = %self.data_source, sql = %sql, params = params.len(), "Selecting rows");
        let rows = with_deadline(self.query_timeout, "select", async {
            impl_db_dispatch!(&self.pool, {
                MySql(pool) => collect_decoded(executor::mysql::fetch(pool, sql, params)).await,
                Postgres(pool) => collect_decoded(executor::postgres::fetch(pool, sql, params)).await,
                SQLite(pool) => collect_decoded(executor::sqlite::fetch(pool, sql, params)).await,
            })
        })
        .await?;
        debug!(data_source = %self.data_source, rows = rows.len(), "Select finished");
        Ok(rows)
    }
}

/// Column names and parameter count reported for a prepared statement.
fn describe<'q, S: sqlx::Statement<'q>>(stmt: S) -> (Vec<String>, Option<usize>) {
    use sqlx::Column;

    let columns = stmt
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();
    let parameter_count = stmt.parameters().map(|params| match params {
        sqlx::Either::Left(types) => types.len(),
        sqlx::Either::Right(count) => count,
    });
    (columns, parameter_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_handle() -> ConnectionHandle {
        // One connection so every statement sees the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ConnectionHandle::new("mem", DbPool::SQLite(pool))
    }

    #[tokio::test]
    async fn test_clones_share_pool_and_id() {
        let handle = memory_handle().await;
        let clone = handle.clone();
        let untimed = handle.with_query_timeout(None);
        assert_eq!(clone.id(), handle.id());
        assert_eq!(untimed.id(), handle.id());
        assert_eq!(untimed.query_timeout(), None);
        assert_eq!(handle.data_source(), "mem");
        assert_eq!(handle.db_type(), DatabaseType::SQLite);

        handle.close().await;
        assert!(clone.is_closed());
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let handle = memory_handle().await;
        handle.close().await;
        let err = handle.select("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_exec_and_query_row() {
        let handle = memory_handle().await;
        handle
            .exec("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[])
            .await
            .unwrap();
        let result = handle
            .exec("INSERT INTO t (v) VALUES (?)", &[QueryParam::from("x")])
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.last_insert_id, Some(1));

        let row = handle
            .query_row("SELECT id, v FROM t WHERE id = ?", &[QueryParam::Int(1)])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("v").unwrap(), Some("x".to_string()));

        let none = handle
            .query_row("SELECT id FROM t WHERE id = ?", &[QueryParam::Int(99)])
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_query_streams_rows() {
        let handle = memory_handle().await;
        let rows: Vec<DbRow> = handle
            .query("SELECT 1 AS a UNION ALL SELECT 2", &[])
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].cell(0).unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_prepare_reports_metadata() {
        let handle = memory_handle().await;
        let stmt = handle.prepare("SELECT ? AS a, ? AS b").await.unwrap();
        assert_eq!(stmt.columns(), ["a", "b"]);
        assert_eq!(stmt.parameter_count(), Some(2));
        assert_eq!(stmt.sql(), "SELECT ? AS a, ? AS b");
    }

    #[tokio::test]
    async fn test_prepare_rejects_bad_sql() {
        let handle = memory_handle().await;
        let err = handle.prepare("SELEC nonsense").await.unwrap_err();
        assert!(matches!(err, DbError::Query { .. }));
    }
}
