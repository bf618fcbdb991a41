use refsync_core::db::migrations::latest_version;
use refsync_core::db::{open_db, open_db_in_memory, open_db_with_config, DbError};
use refsync_core::{DocumentStore, EngineConfig, SqliteDocumentStore, StoreError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "documents");
    assert_index_exists(&conn, "idx_documents_collection_updated");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refsync.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "documents");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn configured_busy_timeout_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        busy_timeout_ms: 1234,
        ..EngineConfig::default()
    };

    let conn = open_db_with_config(dir.path().join("timeout.db"), &config).unwrap();
    let timeout: i64 = conn
        .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 1234);
}

#[test]
fn store_requires_documents_table() {
    let mut conn = Connection::open_in_memory().unwrap();
    let err = SqliteDocumentStore::try_new(&mut conn, &EngineConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, StoreError::MissingRequiredTable("documents")));
}

#[test]
fn documents_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist.db");
    let target = refsync_core::DocPath::new("posts", "p1");

    {
        let mut conn = open_db(&path).unwrap();
        let mut store = SqliteDocumentStore::try_new(&mut conn, &EngineConfig::default()).unwrap();
        store
            .run_transaction(|txn| {
                let mut doc = refsync_core::Document::new();
                doc.insert("title".to_string(), serde_json::json!("kept"));
                txn.put(&target, &doc)
            })
            .unwrap();
    }

    let mut conn = open_db(&path).unwrap();
    let mut store = SqliteDocumentStore::try_new(&mut conn, &EngineConfig::default()).unwrap();
    let doc = store
        .run_transaction(|txn| txn.read(&target))
        .unwrap()
        .unwrap();
    assert_eq!(doc["title"], serde_json::json!("kept"));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    assert!(
        sqlite_object_exists(conn, "table", table_name),
        "table {table_name} does not exist"
    );
}

fn assert_index_exists(conn: &Connection, index_name: &str) {
    assert!(
        sqlite_object_exists(conn, "index", index_name),
        "index {index_name} does not exist"
    );
}

fn sqlite_object_exists(conn: &Connection, kind: &str, name: &str) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            );",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    exists == 1
}
