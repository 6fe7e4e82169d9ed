//! Integration tests for string-row decoding against SQLite files.

use db_session::config::ConfigTree;
use db_session::{ConnectionHandle, DbError, QueryParam, SessionRegistry, params};
use futures_util::TryStreamExt;
use std::sync::Arc;
use tempfile::TempDir;

/// Open a handle on a fresh SQLite file seeded with a `users` table.
///
/// The `TempDir` must outlive the handle.
async fn setup_db() -> (TempDir, SessionRegistry, Arc<ConnectionHandle>) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("app.db");
    let config = format!(
        "[database.app]\ndsn = \"sqlite:{}?mode=rwc\"\n",
        db_path.display()
    );
    let tree = ConfigTree::parse(&config, dir.path().join("database.toml")).unwrap();
    let registry = SessionRegistry::new(Arc::new(tree));
    let handle = registry.get("app").await.unwrap();

    handle
        .exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .await
        .unwrap();
    handle
        .exec(
            "INSERT INTO users (id, name) VALUES (?, ?), (?, ?)",
            &params![1, "a", 2, None::<String>],
        )
        .await
        .unwrap();

    (dir, registry, handle)
}

#[tokio::test]
async fn test_select_decodes_rows_with_null_as_empty() {
    let (_dir, _registry, handle) = setup_db().await;

    let rows = handle
        .select("SELECT id, name FROM users ORDER BY id", &[])
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_string(&rows).unwrap(),
        r#"[{"id":"1","name":"a"},{"id":"2","name":""}]"#
    );
}

#[tokio::test]
async fn test_select_preserves_column_order() {
    let (_dir, _registry, handle) = setup_db().await;

    let rows = handle
        .select("SELECT name, id FROM users WHERE id = ?", &[QueryParam::Int(1)])
        .await
        .unwrap();

    let columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(columns, ["name", "id"]);
}

#[tokio::test]
async fn test_select_zero_rows() {
    let (_dir, _registry, handle) = setup_db().await;

    let rows = handle
        .select("SELECT id FROM users WHERE id > ?", &params![100])
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_select_renders_storage_classes() {
    let (_dir, _registry, handle) = setup_db().await;

    let rows = handle
        .select(
            "SELECT 1.5 AS r, x'6869' AS b, 1 + 1 AS e, 'txt' AS t, NULL AS n",
            &[],
        )
        .await
        .unwrap();

    let row = &rows[0];
    assert_eq!(row["r"], "1.5");
    assert_eq!(row["b"], "hi");
    assert_eq!(row["e"], "2");
    assert_eq!(row["t"], "txt");
    assert_eq!(row["n"], "");
}

#[tokio::test]
async fn test_select_duplicate_columns_keep_last_value() {
    let (_dir, _registry, handle) = setup_db().await;

    let rows = handle.select("SELECT 1 AS v, 2 AS v", &[]).await.unwrap();
    assert_eq!(rows[0].len(), 1);
    assert_eq!(rows[0]["v"], "2");
}

#[tokio::test]
async fn test_select_bad_sql_is_query_error() {
    let (_dir, _registry, handle) = setup_db().await;

    let err = handle.select("SELECT * FROM missing_table", &[]).await.unwrap_err();
    assert!(matches!(err, DbError::Query { .. }));
    assert!(!err.is_setup_error());
}

#[tokio::test]
async fn test_select_error_after_first_row_discards_result() {
    let (_dir, _registry, handle) = setup_db().await;
    // abs() of i64::MIN overflows on the second row only.
    let sql = "SELECT abs(x) AS v FROM (SELECT 1 AS x UNION ALL SELECT -9223372036854775808)";

    let err = handle.select(sql, &[]).await.unwrap_err();
    assert!(matches!(err, DbError::Query { .. }));

    let mut rows = handle.query(sql, &[]);
    let first = rows.try_next().await.unwrap().unwrap();
    assert_eq!(first.get("v").unwrap().as_deref(), Some("1"));
    assert!(rows.try_next().await.is_err());
}

#[tokio::test]
async fn test_query_stream_and_row_access() {
    let (_dir, _registry, handle) = setup_db().await;

    let rows: Vec<_> = handle
        .query("SELECT id, name FROM users ORDER BY id", &[])
        .try_collect()
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].column_names(), ["id", "name"]);
    assert_eq!(rows[1].get("name").unwrap(), None);
    assert_eq!(rows[1].decode().unwrap()["name"], "");
}

#[tokio::test]
async fn test_exec_reports_affected_rows() {
    let (_dir, _registry, handle) = setup_db().await;

    let result = handle
        .exec("UPDATE users SET name = ? WHERE id > ?", &params!["z", 0])
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 2);

    let result = handle
        .exec("INSERT INTO users (name) VALUES (?)", &params!["c"])
        .await
        .unwrap();
    assert_eq!(result.last_insert_id, Some(3));
}

#[tokio::test]
async fn test_prepared_statement_runs_repeatedly() {
    let (_dir, _registry, handle) = setup_db().await;

    let stmt = handle
        .prepare("SELECT name FROM users WHERE id = ?")
        .await
        .unwrap();
    assert_eq!(stmt.columns(), ["name"]);

    let first = stmt.query_row(&params![1]).await.unwrap().unwrap();
    assert_eq!(first.get("name").unwrap().as_deref(), Some("a"));

    let second = stmt.select(&params![2]).await.unwrap();
    assert_eq!(second[0]["name"], "");
}
