use crate::db::decode::DbRow;
use crate::db::executor::RowStream;
use crate::db::handle::ConnectionHandle;
use crate::error::{DbError, DbResult};
use crate::models::{DecodedRow, ExecResult, QueryParam};
use futures_util::StreamExt;
use futures_util::stream;

/// A statement validated by the server, bound to the handle that prepared it.
///
/// The server-side statement is cached per pooled connection by the driver,
/// so repeated runs reuse it without another round trip for parsing.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    handle: ConnectionHandle,
    sql: String,
    columns: Vec<String>,
    parameter_count: Option<usize>,
}

impl PreparedStatement {
    pub(crate) fn new(
        handle: ConnectionHandle,
        sql: String,
        columns: Vec<String>,
        parameter_count: Option<usize>,
    ) -> Self {
        Self {
            handle,
            sql,
            columns,
            parameter_count,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Result column names, empty for statements that return no rows.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of placeholders, when the driver reports it.
    pub fn parameter_count(&self) -> Option<usize> {
        self.parameter_count
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub async fn exec(&self, params: &[QueryParam]) -> DbResult<ExecResult> {
        self.check_arity(params)?;
        self.handle.exec(&self.sql, params).await
    }

    /// Stream the rows. An arity mismatch is the stream's only item.
    pub fn query<'a>(&'a self, params: &'a [QueryParam]) -> RowStream<'a> {
        match self.check_arity(params) {
            Ok(()) => self.handle.query(&self.sql, params),
            Err(err) => stream::once(async move { Err(err) }).boxed(),
        }
    }

    pub async fn query_row(&self, params: &[QueryParam]) -> DbResult<Option<DbRow>> {
        self.check_arity(params)?;
        self.handle.query_row(&self.sql, params).await
    }

    pub async fn select(&self, params: &[QueryParam]) -> DbResult<Vec<DecodedRow>> {
        self.check_arity(params)?;
        self.handle.select(&self.sql, params).await
    }

    fn check_arity(&self, params: &[QueryParam]) -> DbResult<()> {
        match self.parameter_count {
            Some(expected) if expected != params.len() => Err(DbError::query(
                format!(
                    "Statement expects {} parameter(s), got {}",
                    expected,
                    params.len()
                ),
                None,
                "Pass one value per placeholder",
            )),
            _ => Ok(()),
        }
    }
}
