//! In-memory cache of items created locally but not yet persisted.
//!
//! The reference engine reads it while resolving add-action targets; only the
//! lifecycle mutates it, and only after a transaction commits.

use crate::model::item::Item;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct LocalItemCache {
    items: Mutex<BTreeMap<String, Item>>,
}

impl LocalItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an item under its reference key, replacing older entries.
    pub fn insert(&self, item: Item) {
        self.lock().insert(item.ref_key(), item);
    }

    /// Returns the cached item for `key` if it is still local-only.
    pub fn pending(&self, key: &str) -> Option<Item> {
        self.lock()
            .get(key)
            .filter(|item| item.is_local_only())
            .cloned()
    }

    pub fn get(&self, key: &str) -> Option<Item> {
        self.lock().get(key).cloned()
    }

    /// Flags the cached item as persisted. Returns `false` for unknown keys.
    pub fn mark_persisted(&self, key: &str) -> bool {
        match self.lock().get_mut(key) {
            Some(item) => {
                item.mark_persisted();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, key: &str) -> Option<Item> {
        self.lock().remove(key)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Item>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
