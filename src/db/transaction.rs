//! Transactions started from a [`ConnectionHandle`](crate::db::ConnectionHandle).
//!
//! A transaction pins one pooled connection until it is committed, rolled
//! back, or dropped. Dropping an unfinished transaction rolls it back.

use crate::db::decode::DbRow;
use crate::db::executor::{
    self, RowStream, collect_decoded, into_row_stream, stream_with_deadline, with_deadline,
};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, DecodedRow, ExecResult, QueryParam};
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use std::time::Duration;
use tracing::debug;

/// Database-specific transaction.
#[derive(Debug)]
enum Tx {
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    SQLite(Transaction<'static, Sqlite>),
}

/// An open transaction.
#[derive(Debug)]
pub struct DbTransaction {
    tx: Tx,
    data_source: String,
    query_timeout: Option<Duration>,
}

impl DbTransaction {
    pub(crate) fn mysql(
        tx: Transaction<'static, MySql>,
        data_source: &str,
        query_timeout: Option<Duration>,
    ) -> Self {
        Self::new(Tx::MySql(tx), data_source, query_timeout)
    }

    pub(crate) fn postgres(
        tx: Transaction<'static, Postgres>,
        data_source: &str,
        query_timeout: Option<Duration>,
    ) -> Self {
        Self::new(Tx::Postgres(tx), data_source, query_timeout)
    }

    pub(crate) fn sqlite(
        tx: Transaction<'static, Sqlite>,
        data_source: &str,
        query_timeout: Option<Duration>,
    ) -> Self {
        Self::new(Tx::SQLite(tx), data_source, query_timeout)
    }

    fn new(tx: Tx, data_source: &str, query_timeout: Option<Duration>) -> Self {
        Self {
            tx,
            data_source: data_source.to_string(),
            query_timeout,
        }
    }

    /// Get the database type for this transaction.
    pub fn db_type(&self) -> DatabaseType {
        match self.tx {
            Tx::MySql(_) => DatabaseType::MySQL,
            Tx::Postgres(_) => DatabaseType::PostgreSQL,
            Tx::SQLite(_) => DatabaseType::SQLite,
        }
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// Run a statement that returns no rows.
    pub async fn exec(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<ExecResult> {
        debug!(data_source = %self.data_source, sql = %sql, params = params.len(), "Executing statement in transaction");
        let limit = self.query_timeout;
        let tx = &mut self.tx;
        with_deadline(limit, "exec", async move {
            let result = match tx {
                Tx::MySql(tx) => executor::mysql::execute(&mut **tx, sql, params).await,
                Tx::Postgres(tx) => executor::postgres::execute(&mut **tx, sql, params).await,
                Tx::SQLite(tx) => executor::sqlite::execute(&mut **tx, sql, params).await,
            };
            result.map_err(DbError::from)
        })
        .await
    }

    /// Stream the rows of a query. The transaction stays borrowed until the
    /// stream is dropped.
    pub fn query<'a>(&'a mut self, sql: &'a str, params: &'a [QueryParam]) -> RowStream<'a> {
        let limit = self.query_timeout;
        let rows = match &mut self.tx {
            Tx::MySql(tx) => into_row_stream(executor::mysql::fetch(&mut **tx, sql, params)),
            Tx::Postgres(tx) => into_row_stream(executor::postgres::fetch(&mut **tx, sql, params)),
            Tx::SQLite(tx) => into_row_stream(executor::sqlite::fetch(&mut **tx, sql, params)),
        };
        stream_with_deadline(rows, limit)
    }

    /// Fetch at most one row.
    pub async fn query_row(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Option<DbRow>> {
        let limit = self.query_timeout;
        let tx = &mut self.tx;
        with_deadline(limit, "query_row", async move {
            let row = match tx {
                Tx::MySql(tx) => executor::mysql::fetch_optional(&mut **tx, sql, params)
                    .await
                    .map(|r| r.map(DbRow::from)),
                Tx::Postgres(tx) => executor::postgres::fetch_optional(&mut **tx, sql, params)
                    .await
                    .map(|r| r.map(DbRow::from)),
                Tx::SQLite(tx) => executor::sqlite::fetch_optional(&mut **tx, sql, params)
                    .await
                    .map(|r| r.map(DbRow::from)),
            };
            row.map_err(DbError::from)
        })
        .await
    }

    /// Run a query and decode every row as strings; see
    /// [`ConnectionHandle::select`](crate::db::ConnectionHandle::select).
    pub async fn select(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<DecodedRow>> {
        debug!(data_source = %self.data_source, sql = %sql, params = params.len(), "Selecting in transaction");
        let limit = self.query_timeout;
        let tx = &mut self.tx;
        with_deadline(limit, "select", async move {
            match tx {
                Tx::MySql(tx) => collect_decoded(executor::mysql::fetch(&mut **tx, sql, params)).await,
                Tx::Postgres(tx) => {
                    collect_decoded(executor::postgres::fetch(&mut **tx, sql, params)).await
                }
                Tx::SQLite(tx) => collect_decoded(executor::sqlite::fetch(&mut **tx, sql, params)).await,
            }
        })
        .await
    }

    /// Commit the transaction.
    pub async fn commit(self) -> DbResult<()> {
        let Self { tx, data_source, query_timeout } = self;
        debug!(data_source = %data_source, "Committing transaction");
        with_deadline(query_timeout, "commit", async move {
            match tx {
                Tx::MySql(tx) => tx.commit().await.map_err(DbError::from),
                Tx::Postgres(tx) => tx.commit().await.map_err(DbError::from),
                Tx::SQLite(tx) => tx.commit().await.map_err(DbError::from),
            }
        })
        .await
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> DbResult<()> {
        let Self { tx, data_source, query_timeout } = self;
        debug!(data_source = %data_source, "Rolling back transaction");
        with_deadline(query_timeout, "rollback", async move {
            match tx {
                Tx::MySql(tx) => tx.rollback().await.map_err(DbError::from),
                Tx::Postgres(tx) => tx.rollback().await.map_err(DbError::from),
                Tx::SQLite(tx) => tx.rollback().await.map_err(DbError::from),
            }
        })
        .await
    }
}
