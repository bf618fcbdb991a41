//! Item lifecycle service.
//!
//! # Responsibility
//! - Run add/update/delete as one transaction: reference hook, search hook,
//!   then the primary write.
//! - Reconcile the local item cache once a transaction commits.
//!
//! # Invariants
//! - Hooks run at most once per attempt and are re-run in full on retry.
//! - Updates whose dirty properties carry no update trigger skip hooks.
//! - Cache entries are marked persisted only after commit.

use crate::config::EngineConfig;
use crate::hooks::HookContext;
use crate::model::cache::LocalItemCache;
use crate::model::item::Item;
use crate::model::schema::{Schema, SchemaError};
use crate::refs::engine::{
    on_refs_add_item, on_refs_delete_item, on_refs_update_item, RefsReport,
};
use crate::refs::RefsError;
use crate::repo::document_repo::{Document, DocumentStore, Patch, Retryable, StoreError};
use crate::search::index::{
    on_search_add_item, on_search_delete_item, on_search_update_item, search_items, SearchHit,
    SearchQuery,
};
use crate::search::tokenizer::Tokenizer;
use crate::search::SearchError;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ServiceError {
    Store(StoreError),
    Refs(RefsError),
    Search(SearchError),
    Schema(SchemaError),
    /// Update target does not exist in the store.
    NotFound(String),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Refs(err) => write!(f, "{err}"),
            Self::Search(err) => write!(f, "{err}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::NotFound(path) => write!(f, "item not found: {path}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Refs(err) => Some(err),
            Self::Search(err) => Some(err),
            Self::Schema(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<RefsError> for ServiceError {
    fn from(value: RefsError) -> Self {
        Self::Refs(value)
    }
}

impl From<SearchError> for ServiceError {
    fn from(value: SearchError) -> Self {
        Self::Search(value)
    }
}

impl From<SchemaError> for ServiceError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl Retryable for ServiceError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::Refs(err) => err.is_retryable(),
            Self::Search(err) => err.is_retryable(),
            Self::Schema(_) | Self::NotFound(_) => false,
        }
    }
}

/// What one lifecycle call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    pub refs: RefsReport,
    pub search_indexed: bool,
    pub hooks_ran: bool,
    /// The primary write replaced the whole document.
    pub full_update: bool,
}

/// Lifecycle entry points over a document store.
pub struct ItemService<'a, S: DocumentStore> {
    store: S,
    schema: &'a Schema,
    cache: &'a LocalItemCache,
    config: &'a EngineConfig,
    tokenizer: &'a dyn Tokenizer,
}

impl<'a, S: DocumentStore> ItemService<'a, S> {
    pub fn new(
        store: S,
        schema: &'a Schema,
        cache: &'a LocalItemCache,
        config: &'a EngineConfig,
        tokenizer: &'a dyn Tokenizer,
    ) -> Self {
        Self {
            store,
            schema,
            cache,
            config,
            tokenizer,
        }
    }

    fn context(&self) -> HookContext<'a> {
        HookContext {
            schema: self.schema,
            cache: self.cache,
            config: self.config,
            tokenizer: self.tokenizer,
        }
    }

    /// Writes `item` with its full in-memory state.
    pub fn add_item(&mut self, item: &mut Item) -> ServiceResult<LifecycleReport> {
        let started_at = Instant::now();
        let ctx = self.context();
        let state = item.state().clone();
        let current: &Item = item;

        let result = self.store.run_transaction(|txn| {
            let refs = on_refs_add_item(&ctx, current, txn, &state)?;
            let search_indexed = on_search_add_item(&ctx, current, txn, &state)?;
            current.save(txn)?;
            Ok::<_, ServiceError>(LifecycleReport {
                refs,
                search_indexed,
                hooks_ran: true,
                full_update: true,
            })
        });
        let report = self.finish("item_add", current, started_at, result)?;

        self.cache.mark_persisted(&item.ref_key());
        item.mark_persisted();
        item.apply_changes(&Document::new());
        Ok(report)
    }

    /// Applies `changes` to a persisted item.
    ///
    /// The keys of `changes` become the item's dirty set until the call
    /// returns. Without a dirty update trigger the changes are merged field by
    /// field and no hook runs.
    pub fn update_item(
        &mut self,
        item: &mut Item,
        changes: Document,
    ) -> ServiceResult<LifecycleReport> {
        let started_at = Instant::now();
        let ctx = self.context();
        item.stage_changes(&changes);
        let trigger = item.model().triggers_for(item.dirty_properties());
        let current: &Item = item;

        let result = self.store.run_transaction(|txn| {
            let path = current.path();
            let Some(mut persisted) = txn.read(&path)? else {
                return Err(ServiceError::NotFound(path.to_string()));
            };

            let mut report = LifecycleReport::default();
            if trigger.is_some() {
                report.refs = on_refs_update_item(&ctx, current, txn, &changes)?;
                report.search_indexed = on_search_update_item(&ctx, current, txn, &changes)?;
                report.hooks_ran = true;
            }

            if trigger.is_some_and(|trigger| trigger.forces_full_update) {
                for (key, value) in &changes {
                    persisted.insert(key.clone(), value.clone());
                }
                txn.put(&path, &persisted)?;
                report.full_update = true;
            } else {
                let patch = Patch::from_document(&changes);
                if !patch.is_empty() {
                    txn.set(&path, &patch)?;
                }
            }
            Ok(report)
        });
        let report = match self.finish("item_update", current, started_at, result) {
            Ok(report) => report,
            Err(err) => {
                item.discard_staged();
                return Err(err);
            }
        };

        item.apply_changes(&changes);
        Ok(report)
    }

    /// Deletes `item`, its reference side effects and its search entry.
    pub fn delete_item(&mut self, item: &Item) -> ServiceResult<LifecycleReport> {
        let started_at = Instant::now();
        let ctx = self.context();

        let result = self.store.run_transaction(|txn| {
            let refs = on_refs_delete_item(&ctx, item, txn)?;
            let search_indexed = on_search_delete_item(&ctx, item, txn)?;
            txn.delete(&item.path())?;
            Ok::<_, ServiceError>(LifecycleReport {
                refs,
                search_indexed,
                hooks_ran: true,
                full_update: false,
            })
        });
        let report = self.finish("item_delete", item, started_at, result)?;

        self.cache.remove(&item.ref_key());
        Ok(report)
    }

    /// Loads a persisted item, or `None` when absent.
    pub fn get_item(&mut self, model: &str, id: &str) -> ServiceResult<Option<Item>> {
        let descriptor = self.schema.model(model)?;
        let path = descriptor.item(id);
        let state = self
            .store
            .run_transaction(|txn| Ok::<_, ServiceError>(txn.read(&path)?))?;
        match state {
            Some(state) => Ok(Some(self.schema.item(model, id, state)?)),
            None => Ok(None),
        }
    }

    pub fn search(&mut self, query: &SearchQuery) -> ServiceResult<Vec<SearchHit>> {
        let config = self.config;
        let tokenizer = self.tokenizer;
        self.store.run_transaction(|txn| {
            Ok::<_, ServiceError>(search_items(txn, config, tokenizer, query)?)
        })
    }

    fn finish(
        &self,
        event: &str,
        item: &Item,
        started_at: Instant,
        result: ServiceResult<LifecycleReport>,
    ) -> ServiceResult<LifecycleReport> {
        match result {
            Ok(report) => {
                for key in &report.refs.persisted_locals {
                    self.cache.mark_persisted(key);
                }
                info!(
                    "event={} module=service status=ok model={} item_id={} hooks_ran={} refs_added={} refs_removed={} actions_run={} search_indexed={} duration_ms={}",
                    event,
                    item.model().name(),
                    item.id(),
                    report.hooks_ran,
                    report.refs.added,
                    report.refs.removed,
                    report.refs.actions_run,
                    report.search_indexed,
                    started_at.elapsed().as_millis()
                );
                Ok(report)
            }
            Err(err) => {
                error!(
                    "event={} module=service status=error model={} item_id={} duration_ms={} error={}",
                    event,
                    item.model().name(),
                    item.id(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }
}
