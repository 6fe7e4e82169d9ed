//! Dispatch and convenience macros.
//!
//! The macros expand at compile time with zero runtime overhead.

/// Macro for generating database dispatch match arms.
///
/// This macro generates match arms for `DbPool` variants, reducing the need
/// to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => do_mysql(p),
///     Postgres(p) => do_postgres(p),
///     SQLite(p) => do_sqlite(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Build a `Vec<QueryParam>` from values convertible into `QueryParam`.
///
/// ```
/// use db_session::{QueryParam, params};
///
/// let args = params![1, "alice", None::<i64>];
/// assert_eq!(args[2], QueryParam::Null);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::models::QueryParam>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::models::QueryParam::from($value)),+]
    };
}

pub use impl_db_dispatch;
pub use params;

#[cfg(test)]
mod tests {
    use crate::models::QueryParam;

    #[test]
    fn test_params_macro_converts_values() {
        let args = params![1, 2.5, "x", true, None::<String>];
        assert_eq!(
            args,
            vec![
                QueryParam::Int(1),
                QueryParam::Float(2.5),
                QueryParam::String("x".to_string()),
                QueryParam::Bool(true),
                QueryParam::Null,
            ]
        );
    }

    #[test]
    fn test_params_macro_empty() {
        let args = params![];
        assert!(args.is_empty());
    }
}
