//! Query-related data models.
//!
//! This module defines statement parameters and the shapes results are returned in.

use indexmap::IndexMap;

/// A result row rendered entirely as strings, keyed by column name.
///
/// Keys keep the column order reported by the result set.
///
/// **A SQL NULL is rendered as the empty string.** The mapping is lossy: a row
/// holding `""` cannot be told apart from one holding NULL. Callers that need
/// to distinguish the two should use [`ConnectionHandle::query`] and inspect
/// the raw row instead.
///
/// [`ConnectionHandle::query`]: crate::db::ConnectionHandle::query
pub type DecodedRow = IndexMap<String, String>;

/// A positional parameter for parameterized statements.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for QueryParam {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Reported by MySQL and SQLite; always `None` on PostgreSQL.
    pub last_insert_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_conversions() {
        assert_eq!(QueryParam::from(7), QueryParam::Int(7));
        assert_eq!(QueryParam::from("a"), QueryParam::String("a".into()));
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some(1.5)), QueryParam::Float(1.5));
    }

    #[test]
    fn test_decoded_row_keeps_insertion_order() {
        let mut row = DecodedRow::new();
        row.insert("z".to_string(), "1".to_string());
        row.insert("a".to_string(), "2".to_string());
        let keys: Vec<_> = row.keys().map(String::as_str).collect();
        assert_eq!(keys, ["z", "a"]);
    }
}
