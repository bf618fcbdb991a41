//! Per-model reference registry.
//!
//! # Responsibility
//! - Map tracked property names to ordered add/remove action lists.
//! - Merge repeated declarations for the same model.
//!
//! # Invariants
//! - Declarations only append: earlier actions keep running first.
//! - A property appears at most once in the tracked list.

use crate::model::schema::{SchemaBuilder, SchemaResult};
use crate::refs::action::RefAction;
use log::debug;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct RefRegistry {
    tracked: Vec<String>,
    add_actions: BTreeMap<String, Vec<RefAction>>,
    remove_actions: BTreeMap<String, Vec<RefAction>>,
}

impl RefRegistry {
    pub fn tracked_properties(&self) -> &[String] {
        &self.tracked
    }

    pub fn is_tracked(&self, property: &str) -> bool {
        self.tracked.iter().any(|tracked| tracked == property)
    }

    pub fn add_actions(&self, property: &str) -> &[RefAction] {
        self.add_actions
            .get(property)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn remove_actions(&self, property: &str) -> &[RefAction] {
        self.remove_actions
            .get(property)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn merge(&mut self, properties: &[&str], add: &[RefAction], remove: &[RefAction]) {
        for property in properties {
            if !self.is_tracked(property) {
                self.tracked.push((*property).to_string());
            }
            self.add_actions
                .entry((*property).to_string())
                .or_default()
                .extend(add.iter().cloned());
            self.remove_actions
                .entry((*property).to_string())
                .or_default()
                .extend(remove.iter().cloned());
        }
    }
}

impl SchemaBuilder {
    /// Tracks `properties` of `model`, running `add_actions` for every id that
    /// appears in one of them and `remove_actions` for every id that leaves.
    ///
    /// The same action lists apply to every listed property. Repeated calls
    /// append to what earlier calls declared.
    pub fn track_refs(
        &mut self,
        model: &str,
        properties: &[&str],
        add_actions: Vec<RefAction>,
        remove_actions: Vec<RefAction>,
    ) -> SchemaResult<()> {
        self.ensure_properties(model, properties)?;
        self.model_mut(model)?
            .refs
            .get_or_insert_with(RefRegistry::default)
            .merge(properties, &add_actions, &remove_actions);
        debug!(
            "event=track_refs module=refs status=ok model={} properties={} add_actions={} remove_actions={}",
            model,
            properties.join(","),
            add_actions.len(),
            remove_actions.len()
        );
        self.mark_triggers_update_txn(model, properties, false)
    }
}
