//! Document store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide transactional read/set/put/delete/list primitives over JSON
//!   documents addressed by `collection/id` paths.
//! - Support atomic array-union and array-remove field writes.
//! - Retry whole transactions on transient lock conflicts.
//!
//! # Invariants
//! - Every write issued through one [`DocTxn`] commits or rolls back together.
//! - `delete` of an absent document is a no-op.
//! - Array-union never introduces duplicates; array-remove removes every
//!   occurrence.

use crate::config::EngineConfig;
use crate::db::DbError;
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// JSON object stored per document.
pub type Document = serde_json::Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage-layer error for document reads/writes and transaction control.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    InvalidData(String),
    MissingRequiredTable(&'static str),
    /// Lock conflicts persisted through every allowed attempt.
    Conflict { attempts: u32 },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid document data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::Conflict { attempts } => {
                write!(f, "transaction conflict persisted after {attempts} attempts")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// Classifies errors that should restart a transaction from scratch.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Db(err) => err.is_busy(),
            _ => false,
        }
    }
}

/// Address of one document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath {
    collection: String,
    id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Display for DocPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// One field mutation inside a [`Patch`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    Set(Value),
    /// Appends each element not already present.
    ArrayUnion(Vec<Value>),
    /// Removes every occurrence of each element.
    ArrayRemove(Vec<Value>),
    Delete,
}

/// Field-level merge applied by [`DocTxn::set`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: BTreeMap<String, FieldWrite>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a patch that sets every field of `doc`.
    pub fn from_document(doc: &Document) -> Self {
        let fields = doc
            .iter()
            .map(|(key, value)| (key.clone(), FieldWrite::Set(value.clone())))
            .collect();
        Self { fields }
    }

    pub fn with(mut self, field: impl Into<String>, write: FieldWrite) -> Self {
        self.insert(field, write);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, write: FieldWrite) {
        self.fields.insert(field.into(), write);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Applies the patch in place.
    ///
    /// A non-array field targeted by an array write is replaced by an array,
    /// the same way the union/remove sentinels behave in hosted document stores.
    pub fn apply_to(&self, doc: &mut Document) {
        for (field, write) in &self.fields {
            match write {
                FieldWrite::Set(value) => {
                    doc.insert(field.clone(), value.clone());
                }
                FieldWrite::Delete => {
                    doc.remove(field);
                }
                FieldWrite::ArrayUnion(elements) => {
                    let mut current = take_array(doc, field);
                    for element in elements {
                        if !current.contains(element) {
                            current.push(element.clone());
                        }
                    }
                    doc.insert(field.clone(), Value::Array(current));
                }
                FieldWrite::ArrayRemove(elements) => {
                    let mut current = take_array(doc, field);
                    current.retain(|value| !elements.contains(value));
                    doc.insert(field.clone(), Value::Array(current));
                }
            }
        }
    }
}

fn take_array(doc: &mut Document, field: &str) -> Vec<Value> {
    match doc.remove(field) {
        Some(Value::Array(values)) => values,
        _ => Vec::new(),
    }
}

/// Transaction-scoped document primitives.
pub trait DocTxn {
    fn read(&self, path: &DocPath) -> StoreResult<Option<Document>>;
    /// Overwrites the whole document.
    fn put(&self, path: &DocPath, doc: &Document) -> StoreResult<()>;
    fn delete(&self, path: &DocPath) -> StoreResult<()>;
    /// Lists a collection ordered by document id.
    fn list(&self, collection: &str) -> StoreResult<Vec<(DocPath, Document)>>;

    /// Merges `patch` into the document, creating it when absent.
    fn set(&self, path: &DocPath, patch: &Patch) -> StoreResult<()> {
        let mut doc = self.read(path)?.unwrap_or_default();
        patch.apply_to(&mut doc);
        self.put(path, &doc)
    }
}

/// Transaction runner over a document backend.
pub trait DocumentStore {
    /// Runs `body` in one transaction, committing on `Ok` and rolling back on
    /// `Err`. Retryable failures restart `body` from scratch, so it must be
    /// safe to execute more than once.
    fn run_transaction<T, E, F>(&mut self, body: F) -> Result<T, E>
    where
        F: FnMut(&dyn DocTxn) -> Result<T, E>,
        E: From<StoreError> + Retryable;
}

/// [`DocTxn`] bound to an open SQLite transaction.
pub struct SqliteDocTxn<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocTxn<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DocTxn for SqliteDocTxn<'_> {
    fn read(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM documents WHERE collection = ?1 AND id = ?2;",
                params![path.collection(), path.id()],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|text| parse_document(path, &text)).transpose()
    }

    fn put(&self, path: &DocPath, doc: &Document) -> StoreResult<()> {
        let data = serde_json::to_string(doc)?;
        self.conn.execute(
            "INSERT INTO documents (collection, id, data, updated_at)
             VALUES (?1, ?2, ?3, (strftime('%s', 'now') * 1000))
             ON CONFLICT (collection, id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at;",
            params![path.collection(), path.id(), data],
        )?;
        Ok(())
    }

    fn delete(&self, path: &DocPath) -> StoreResult<()> {
        self.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2;",
            params![path.collection(), path.id()],
        )?;
        Ok(())
    }

    fn list(&self, collection: &str) -> StoreResult<Vec<(DocPath, Document)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, data FROM documents WHERE collection = ?1 ORDER BY id ASC;")?;
        let mut rows = stmt.query([collection])?;
        let mut docs = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get("id")?;
            let data: String = row.get("data")?;
            let path = DocPath::new(collection, id);
            let doc = parse_document(&path, &data)?;
            docs.push((path, doc));
        }
        Ok(docs)
    }
}

/// SQLite-backed document store.
pub struct SqliteDocumentStore<'conn> {
    conn: &'conn mut Connection,
    max_attempts: u32,
}

impl<'conn> SqliteDocumentStore<'conn> {
    /// Constructs a store from a migrated connection.
    pub fn try_new(conn: &'conn mut Connection, config: &EngineConfig) -> StoreResult<Self> {
        if !table_exists(conn, "documents")? {
            return Err(StoreError::MissingRequiredTable("documents"));
        }
        Ok(Self {
            conn,
            max_attempts: config.max_txn_attempts.max(1),
        })
    }

    fn attempt<T, E, F>(&mut self, body: &mut F) -> Result<T, E>
    where
        F: FnMut(&dyn DocTxn) -> Result<T, E>,
        E: From<StoreError> + Retryable,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| E::from(StoreError::from(err)))?;
        let value = {
            let txn = SqliteDocTxn::new(&tx);
            body(&txn)?
        };
        tx.commit().map_err(|err| E::from(StoreError::from(err)))?;
        Ok(value)
    }
}

impl DocumentStore for SqliteDocumentStore<'_> {
    fn run_transaction<T, E, F>(&mut self, mut body: F) -> Result<T, E>
    where
        F: FnMut(&dyn DocTxn) -> Result<T, E>,
        E: From<StoreError> + Retryable,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt(&mut body) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempts < self.max_attempts => {
                    warn!(
                        "event=txn_retry module=store status=retry attempt={} max_attempts={}",
                        attempts, self.max_attempts
                    );
                }
                Err(err) if err.is_retryable() => {
                    warn!(
                        "event=txn_retry module=store status=error error_code=conflict_exhausted attempts={}",
                        attempts
                    );
                    return Err(E::from(StoreError::Conflict { attempts }));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn parse_document(path: &DocPath, raw: &str) -> StoreResult<Document> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(doc) => Ok(doc),
        other => Err(StoreError::InvalidData(format!(
            "document `{path}` is not a JSON object: {other}"
        ))),
    }
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
