//! Item: one record of a model plus its write-tracking state.
//!
//! # Invariants
//! - `dirty` lists exactly the properties carried by the pending write.
//! - A local-only item has never been written to the store.

use crate::model::descriptor::ModelDescriptor;
use crate::repo::document_repo::{DocPath, DocTxn, Document, StoreResult};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Item {
    model: Arc<ModelDescriptor>,
    id: String,
    state: Document,
    dirty: BTreeSet<String>,
    local_only: bool,
}

impl Item {
    /// Wraps a record that already exists in the store.
    pub fn new(model: Arc<ModelDescriptor>, id: impl Into<String>, state: Document) -> Self {
        Self {
            model,
            id: id.into(),
            state,
            dirty: BTreeSet::new(),
            local_only: false,
        }
    }

    /// Creates an in-memory record that has not been saved yet.
    pub fn local(model: Arc<ModelDescriptor>, id: impl Into<String>, state: Document) -> Self {
        Self {
            local_only: true,
            ..Self::new(model, id, state)
        }
    }

    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> DocPath {
        self.model.item(&self.id)
    }

    pub fn ref_key(&self) -> String {
        self.model.ref_key(&self.id)
    }

    pub fn state(&self) -> &Document {
        &self.state
    }

    pub fn is_local_only(&self) -> bool {
        self.local_only
    }

    /// Returns whether `property` is part of the pending write.
    pub fn did_update(&self, property: &str) -> bool {
        self.dirty.contains(property)
    }

    pub fn dirty_properties(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    /// Replaces the dirty set with the keys of `changes`.
    pub fn stage_changes(&mut self, changes: &Document) {
        self.dirty = changes.keys().cloned().collect();
    }

    /// Drops the dirty set of a write that did not commit.
    pub fn discard_staged(&mut self) {
        self.dirty.clear();
    }

    /// Folds committed `changes` into the in-memory state and clears the
    /// dirty set.
    pub fn apply_changes(&mut self, changes: &Document) {
        for (key, value) in changes {
            self.state.insert(key.clone(), value.clone());
        }
        self.dirty.clear();
    }

    /// Reads the persisted state through `txn`; absent records read as empty.
    pub fn read(&self, txn: &dyn DocTxn) -> StoreResult<Document> {
        Ok(txn.read(&self.path())?.unwrap_or_default())
    }

    /// Writes the full in-memory state. Safe to repeat within retries.
    pub fn save(&self, txn: &dyn DocTxn) -> StoreResult<()> {
        txn.put(&self.path(), &self.state)
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.local_only = false;
    }
}
