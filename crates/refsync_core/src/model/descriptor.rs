//! Model descriptors.
//!
//! # Responsibility
//! - Describe one model: storage collection, property metadata, reference
//!   registry, search configuration and update triggers.
//!
//! # Invariants
//! - Descriptors are only mutated through `SchemaBuilder` during model
//!   definition; a built `Schema` shares them read-only.

use crate::model::meta::PropertyMeta;
use crate::refs::registry::RefRegistry;
use crate::repo::document_repo::DocPath;
use crate::search::index::SearchConfig;
use std::collections::BTreeMap;

/// Per-property flag consulted by the lifecycle before an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateTrigger {
    /// Update writes the full merged document instead of a field merge.
    pub forces_full_update: bool,
}

#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub(crate) name: String,
    pub(crate) collection: String,
    pub(crate) properties: BTreeMap<String, PropertyMeta>,
    pub(crate) refs: Option<RefRegistry>,
    pub(crate) search: Option<SearchConfig>,
    pub(crate) update_triggers: BTreeMap<String, UpdateTrigger>,
}

impl ModelDescriptor {
    pub(crate) fn new(name: &str, collection: &str) -> Self {
        Self {
            name: name.to_string(),
            collection: collection.to_string(),
            properties: BTreeMap::new(),
            refs: None,
            search: None,
            update_triggers: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn property(&self, name: &str) -> Option<&PropertyMeta> {
        self.properties.get(name)
    }

    pub fn refs(&self) -> Option<&RefRegistry> {
        self.refs.as_ref()
    }

    pub fn search(&self) -> Option<&SearchConfig> {
        self.search.as_ref()
    }

    pub fn update_trigger(&self, property: &str) -> Option<UpdateTrigger> {
        self.update_triggers.get(property).copied()
    }

    /// Combines the triggers of every listed property.
    ///
    /// Returns `None` when no listed property triggers the hook path.
    pub fn triggers_for<'p>(
        &self,
        properties: impl IntoIterator<Item = &'p str>,
    ) -> Option<UpdateTrigger> {
        properties
            .into_iter()
            .filter_map(|property| self.update_trigger(property))
            .reduce(|acc, next| UpdateTrigger {
                forces_full_update: acc.forces_full_update || next.forces_full_update,
            })
    }

    /// Handle of the record with `id` in this model's collection.
    pub fn item(&self, id: &str) -> DocPath {
        DocPath::new(self.collection.as_str(), id)
    }

    /// Key of the record with `id` in the local item cache.
    pub fn ref_key(&self, id: &str) -> String {
        self.item(id).to_string()
    }

    pub(crate) fn mark_trigger(&mut self, property: &str, forces_full_update: bool) {
        let trigger = self.update_triggers.entry(property.to_string()).or_default();
        trigger.forces_full_update |= forces_full_update;
    }
}
