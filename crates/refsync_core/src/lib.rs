//! Reference maintenance and search indexing for a transactional document
//! store.
//!
//! Models declare tracked relations and indexed properties once through
//! [`SchemaBuilder`]; every item write then runs the reference and search
//! hooks inside the same store transaction as the write itself.

pub mod config;
pub mod db;
pub mod hooks;
pub mod logging;
pub mod model;
pub mod refs;
pub mod repo;
pub mod search;
pub mod service;

pub use config::{load_config, ConfigError, EngineConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_config, DbError, DbResult};
pub use hooks::HookContext;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::cache::LocalItemCache;
pub use model::descriptor::{ModelDescriptor, UpdateTrigger};
pub use model::item::Item;
pub use model::meta::{ArrayType, PropertyKind, PropertyMeta};
pub use model::schema::{Schema, SchemaBuilder, SchemaError, SchemaResult};
pub use refs::action::{ActionHandler, RefAction};
pub use refs::associations::Cardinality;
pub use refs::engine::{
    on_refs_add_item, on_refs_delete_item, on_refs_update_item, RefTarget, RefsReport,
};
pub use refs::registry::RefRegistry;
pub use refs::{RefsError, RefsResult};
pub use repo::document_repo::{
    DocPath, DocTxn, Document, DocumentStore, FieldWrite, Patch, Retryable, SqliteDocumentStore,
    StoreError, StoreResult,
};
pub use search::index::{
    on_search_add_item, on_search_delete_item, on_search_update_item, search_items, Indexer,
    PropertyIndexer, SearchConfig, SearchHit, SearchQuery,
};
pub use search::tokenizer::{PrefixTokenizer, Tokenizer};
pub use search::{SearchError, SearchResult};
pub use service::item_service::{ItemService, LifecycleReport, ServiceError, ServiceResult};

/// Minimal health-check API for smoke checks.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
