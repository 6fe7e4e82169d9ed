//! Statement execution.
//!
//! This module runs statements against anything that implements
//! `sqlx::Executor`, so the same code serves pools and open transactions.
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific fetch and execute operations
//! - `postgres`: PostgreSQL-specific fetch and execute operations
//! - `sqlite`: SQLite-specific fetch and execute operations
//!
//! Each submodule provides identical functionality adapted to the database's type system.
//! Statements without parameters are sent as raw SQL, which lets drivers use their
//! text protocol and accepts SQL that cannot be prepared.

use crate::db::decode::{DbRow, DecodeRow};
use crate::error::{DbError, DbResult};
use crate::models::{DecodedRow, ExecResult, QueryParam};
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// A stream of raw result rows. Dropping it releases the underlying cursor
/// and connection.
pub type RowStream<'a> = BoxStream<'a, DbResult<DbRow>>;

/// Run `fut` under an optional deadline.
pub(crate) async fn with_deadline<T, F>(
    limit: Option<Duration>,
    operation: &str,
    fut: F,
) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match limit {
        Some(limit) => match timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(DbError::timeout(operation, limit)),
        },
        None => fut.await,
    }
}

/// Apply an optional deadline to each wait for the next row. The stream ends
/// after yielding a timeout error.
pub(crate) fn stream_with_deadline<'a>(
    rows: RowStream<'a>,
    limit: Option<Duration>,
) -> RowStream<'a> {
    let Some(limit) = limit else {
        return rows;
    };
    stream::unfold(Some(rows), move |state| async move {
        let mut rows = state?;
        match timeout(limit, rows.next()).await {
            Ok(Some(item)) => Some((item, Some(rows))),
            Ok(None) => None,
            Err(_) => Some((Err(DbError::timeout("row fetch", limit)), None)),
        }
    })
    .boxed()
}

/// Decode every row of a result set. The first error aborts and discards
/// rows decoded so far.
pub(crate) async fn collect_decoded<R: DecodeRow>(
    mut rows: BoxStream<'_, Result<R, sqlx::Error>>,
) -> DbResult<Vec<DecodedRow>> {
    let mut decoded = Vec::new();
    while let Some(row) = rows.try_next().await? {
        decoded.push(row.decode_row()?);
    }
    Ok(decoded)
}

/// Convert a backend row stream into a [`RowStream`].
pub(crate) fn into_row_stream<'a, R>(rows: BoxStream<'a, Result<R, sqlx::Error>>) -> RowStream<'a>
where
    R: Into<DbRow> + Send + 'a,
{
    rows.map_ok(|row| -> DbRow { row.into() })
        .map_err(DbError::from)
        .boxed()
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.

pub(crate) mod mysql {
    use super::*;
    use crate::db::params::mysql_query;
    use sqlx::mysql::MySqlRow;
    use sqlx::{Executor, MySql};

    pub fn fetch<'e, 'c: 'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> BoxStream<'e, Result<MySqlRow, sqlx::Error>>
    where
        E: 'e + Executor<'c, Database = MySql>,
    {
        if params.is_empty() {
            executor.fetch(sql)
        } else {
            mysql_query(sql, params).fetch(executor)
        }
    }

    pub async fn fetch_optional<'e, 'c: 'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> Result<Option<MySqlRow>, sqlx::Error>
    where
        E: 'e + Executor<'c, Database = MySql>,
    {
        if params.is_empty() {
            executor.fetch_optional(sql).await
        } else {
            mysql_query(sql, params).fetch_optional(executor).await
        }
    }

    pub async fn execute<'e, 'c: 'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> Result<ExecResult, sqlx::Error>
    where
        E: 'e + Executor<'c, Database = MySql>,
    {
        let result = if params.is_empty() {
            executor.execute(sql).await?
        } else {
            mysql_query(sql, params).execute(executor).await?
        };
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: i64::try_from(result.last_insert_id()).ok(),
        })
    }
}

pub(crate) mod postgres {
    use super::*;
    use crate::db::params::postgres_query;
    use sqlx::postgres::PgRow;
    use sqlx::{Executor, Postgres};

    pub fn fetch<'e, 'c: 'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> BoxStream<'e, Result<PgRow, sqlx::Error>>
    where
        E: 'e + Executor<'c, Database = Postgres>,
    {
        if params.is_empty() {
            executor.fetch(sql)
        } else {
            postgres_query(sql, params).fetch(executor)
        }
    }

    pub async fn fetch_optional<'e, 'c: 'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> Result<Option<PgRow>, sqlx::Error>
    where
        E: 'e + Executor<'c, Database = Postgres>,
    {
        if params.is_empty() {
            executor.fetch_optional(sql).await
        } else {
            postgres_query(sql, params).fetch_optional(executor).await
        }
    }

    pub async fn execute<'e, 'c: 'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> Result<ExecResult, sqlx::Error>
    where
        E: 'e + Executor<'c, Database = Postgres>,
    {
        let result = if params.is_empty() {
            executor.execute(sql).await?
        } else {
            postgres_query(sql, params).execute(executor).await?
        };
        // PostgreSQL has no last-insert id; use RETURNING instead
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }
}

pub(crate) mod sqlite {
    use super::*;
    use crate::db::params::sqlite_query;
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Executor, Sqlite};

    pub fn fetch<'e, 'c: 'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> BoxStream<'e, Result<SqliteRow, sqlx::Error>>
    where
        E: 'e + Executor<'c, Database = Sqlite>,
    {
        if params.is_empty() {
            executor.fetch(sql)
        } else {
            sqlite_query(sql, params).fetch(executor)
        }
    }

    pub async fn fetch_optional<'e, 'c: 'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> Result<Option<SqliteRow>, sqlx::Error>
    where
        E: 'e + Executor<'c, Database = Sqlite>,
    {
        if params.is_empty() {
            executor.fetch_optional(sql).await
        } else {
            sqlite_query(sql, params).fetch_optional(executor).await
        }
    }

    pub async fn execute<'e, 'c: 'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> Result<ExecResult, sqlx::Error>
    where
        E: 'e + Executor<'c, Database = Sqlite>,
    {
        let result = if params.is_empty() {
            executor.execute(sql).await?
        } else {
            sqlite_query(sql, params).execute(executor).await?
        };
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_deadline_passes_result_through() {
        let value = with_deadline(Some(Duration::from_secs(5)), "noop", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let value = with_deadline(None, "noop", async { Ok("done") }).await.unwrap();
        assert_eq!(value, "done");
    }

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let err = with_deadline(Some(Duration::from_millis(10)), "slow query", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::Timeout { ref operation, .. } if operation == "slow query"));
    }

    #[tokio::test]
    async fn test_stream_deadline_ends_stream_after_timeout() {
        let slow: RowStream<'static> = stream::pending().boxed();
        let mut rows = stream_with_deadline(slow, Some(Duration::from_millis(10)));
        let first = rows.next().await.unwrap();
        assert!(matches!(first, Err(DbError::Timeout { .. })));
        assert!(rows.next().await.is_none());
    }
}
