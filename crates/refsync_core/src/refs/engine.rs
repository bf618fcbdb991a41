//! Reference delta engine.
//!
//! # Responsibility
//! - Compare tracked property values between persisted and candidate state.
//! - Run remove-actions for ids that left and add-actions for ids that
//!   entered, against the referenced records, inside the caller's
//!   transaction.
//!
//! # Invariants
//! - Add treats prior state as empty; delete treats new state as empty.
//! - Updates skip tracked properties that are not dirty.
//! - A pending local-only target is saved, with its own add hooks, before
//!   the add-actions that reference it run.
//! - A record deleted by an action unwinds its own references and search
//!   entry; its document is removed first so reciprocal deletes stop there.
//! - Actions for one id run in registration order; order across ids follows
//!   id ordering and carries no contract.

use crate::hooks::HookContext;
use crate::model::descriptor::ModelDescriptor;
use crate::model::item::Item;
use crate::model::schema::SchemaError;
use crate::refs::action::RefAction;
use crate::refs::delta::{ref_ids, RefDelta};
use crate::refs::RefsResult;
use crate::repo::document_repo::{DocPath, DocTxn, Document};
use crate::search::index::{on_search_add_item, on_search_delete_item};
use log::debug;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Outcome of one reference hook call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefsReport {
    pub added: usize,
    pub removed: usize,
    pub actions_run: usize,
    /// Cache keys of local-only targets saved during this call.
    pub persisted_locals: Vec<String>,
}

impl RefsReport {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }

    fn record_local(&mut self, key: String) {
        if !self.persisted_locals.contains(&key) {
            self.persisted_locals.push(key);
        }
    }
}

#[derive(Clone, Copy)]
enum Prior<'d> {
    Empty,
    Persisted,
    Known(&'d Document),
}

/// Referenced record an action runs against, bound to the hooks of its model.
#[derive(Clone)]
pub struct RefTarget<'a> {
    ctx: HookContext<'a>,
    model: Arc<ModelDescriptor>,
    id: String,
}

impl<'a> RefTarget<'a> {
    pub fn new(ctx: HookContext<'a>, model: Arc<ModelDescriptor>, id: impl Into<String>) -> Self {
        Self {
            ctx,
            model,
            id: id.into(),
        }
    }

    pub fn path(&self) -> DocPath {
        self.model.item(&self.id)
    }

    /// Deletes the record and runs the delete hooks of its model.
    ///
    /// Returns `false` when the record is already absent.
    pub fn delete(&self, txn: &dyn DocTxn) -> RefsResult<bool> {
        let path = self.path();
        let Some(state) = txn.read(&path)? else {
            return Ok(false);
        };
        txn.delete(&path)?;

        let item = Item::new(Arc::clone(&self.model), self.id.as_str(), state);
        let report = apply_refs(
            &self.ctx,
            &item,
            txn,
            Prior::Known(item.state()),
            &Document::new(),
            false,
            "cascade_delete",
        )?;
        let unindexed = on_search_delete_item(&self.ctx, &item, txn)?;
        debug!(
            "event=refs_cascade module=refs status=ok model={} item_id={} removed={} unindexed={}",
            self.model.name(),
            self.id,
            report.removed,
            unindexed
        );
        Ok(true)
    }
}

/// Runs add-actions for every id referenced by `new_state`.
pub fn on_refs_add_item(
    ctx: &HookContext<'_>,
    item: &Item,
    txn: &dyn DocTxn,
    new_state: &Document,
) -> RefsResult<RefsReport> {
    apply_refs(ctx, item, txn, Prior::Empty, new_state, false, "add")
}

/// Runs actions for the difference between persisted state and the dirty
/// properties of `new_state`.
pub fn on_refs_update_item(
    ctx: &HookContext<'_>,
    item: &Item,
    txn: &dyn DocTxn,
    new_state: &Document,
) -> RefsResult<RefsReport> {
    apply_refs(ctx, item, txn, Prior::Persisted, new_state, true, "update")
}

/// Runs remove-actions for every id referenced by the persisted state.
pub fn on_refs_delete_item(
    ctx: &HookContext<'_>,
    item: &Item,
    txn: &dyn DocTxn,
) -> RefsResult<RefsReport> {
    apply_refs(
        ctx,
        item,
        txn,
        Prior::Persisted,
        &Document::new(),
        false,
        "delete",
    )
}

fn apply_refs(
    ctx: &HookContext<'_>,
    item: &Item,
    txn: &dyn DocTxn,
    prior: Prior<'_>,
    new_state: &Document,
    is_update: bool,
    event: &str,
) -> RefsResult<RefsReport> {
    let mut report = RefsReport::default();
    let Some(registry) = item.model().refs() else {
        return Ok(report);
    };

    let mut persisted: Option<Document> = None;
    for property in registry.tracked_properties() {
        if is_update && !item.did_update(property) {
            continue;
        }

        let old_ids = match prior {
            Prior::Empty => Vec::new(),
            Prior::Known(state) => ref_ids(property, state.get(property))?,
            Prior::Persisted => {
                if persisted.is_none() {
                    persisted = Some(item.read(txn)?);
                }
                ref_ids(
                    property,
                    persisted.as_ref().and_then(|state| state.get(property)),
                )?
            }
        };
        let new_ids = ref_ids(property, new_state.get(property))?;
        let delta = RefDelta::between(&old_ids, &new_ids);
        if delta.is_empty() {
            continue;
        }

        let target_model = resolve_target(ctx, item.model(), property)?;
        run_removals(
            ctx,
            txn,
            item,
            &target_model,
            registry.remove_actions(property),
            &delta.removed,
            &mut report,
        )?;
        run_additions(
            ctx,
            txn,
            item,
            &target_model,
            registry.add_actions(property),
            &delta.added,
            &mut report,
        )?;

        debug!(
            "event=refs_delta module=refs status=ok hook={} model={} item_id={} property={} target_model={} added={} removed={}",
            event,
            item.model().name(),
            item.id(),
            property,
            target_model.name(),
            delta.added.len(),
            delta.removed.len()
        );
    }

    if !report.is_noop() {
        debug!(
            "event=refs_apply module=refs status=ok hook={} model={} item_id={} added={} removed={} actions_run={} persisted_locals={}",
            event,
            item.model().name(),
            item.id(),
            report.added,
            report.removed,
            report.actions_run,
            report.persisted_locals.len()
        );
    }
    Ok(report)
}

fn resolve_target(
    ctx: &HookContext<'_>,
    model: &ModelDescriptor,
    property: &str,
) -> RefsResult<Arc<ModelDescriptor>> {
    let meta = model
        .property(property)
        .ok_or_else(|| SchemaError::UnknownProperty {
            model: model.name().to_string(),
            property: property.to_string(),
        })?;
    let target = meta
        .reference_target()
        .ok_or_else(|| SchemaError::UnresolvedReference {
            model: model.name().to_string(),
            property: property.to_string(),
        })?;
    Ok(ctx.schema.model(target)?)
}

fn run_removals(
    ctx: &HookContext<'_>,
    txn: &dyn DocTxn,
    source: &Item,
    target_model: &Arc<ModelDescriptor>,
    actions: &[RefAction],
    ids: &BTreeSet<String>,
    report: &mut RefsReport,
) -> RefsResult<()> {
    for id in ids {
        let target = RefTarget::new(*ctx, Arc::clone(target_model), id.as_str());
        for action in actions {
            action.apply(txn, source, &target)?;
            report.actions_run += 1;
        }
        report.removed += 1;
    }
    Ok(())
}

fn run_additions(
    ctx: &HookContext<'_>,
    txn: &dyn DocTxn,
    source: &Item,
    target_model: &Arc<ModelDescriptor>,
    actions: &[RefAction],
    ids: &BTreeSet<String>,
    report: &mut RefsReport,
) -> RefsResult<()> {
    for id in ids {
        let key = target_model.ref_key(id);
        if let Some(local) = ctx.cache.pending(&key) {
            if let Some(nested) = persist_local(ctx, txn, &local)? {
                report.record_local(key);
                for nested_key in nested.persisted_locals {
                    report.record_local(nested_key);
                }
            }
        }

        let target = RefTarget::new(*ctx, Arc::clone(target_model), id.as_str());
        for action in actions {
            action.apply(txn, source, &target)?;
            report.actions_run += 1;
        }
        report.added += 1;
    }
    Ok(())
}

/// Saves a pending local target and runs its own add hooks.
///
/// Returns `None` when the record is already stored in this transaction.
fn persist_local(
    ctx: &HookContext<'_>,
    txn: &dyn DocTxn,
    local: &Item,
) -> RefsResult<Option<RefsReport>> {
    if txn.read(&local.path())?.is_some() {
        return Ok(None);
    }
    local.save(txn)?;
    let report = apply_refs(ctx, local, txn, Prior::Empty, local.state(), false, "local_add")?;
    on_search_add_item(ctx, local, txn, local.state())?;
    Ok(Some(report))
}
