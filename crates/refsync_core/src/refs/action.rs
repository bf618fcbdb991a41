//! Compensating actions applied to referenced records.
//!
//! # Invariants
//! - Every built-in variant is idempotent: unions and removals are set
//!   operations, `SetId`/`UnsetId` overwrite, deleting an absent record is a
//!   no-op.
//! - `RemoveId` and `UnsetId` never create a missing target record.
//! - `DeleteItem` goes through the target's own delete hooks.

use crate::model::item::Item;
use crate::refs::engine::RefTarget;
use crate::refs::{RefsError, RefsResult};
use crate::repo::document_repo::{DocPath, DocTxn, FieldWrite, Patch};
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// User-provided action body.
///
/// Handlers must be safe to run more than once for the same event because
/// transactions may be retried.
pub trait ActionHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Applies the action to `target`. The default body reports the handler
    /// as unimplemented.
    fn run(&self, _txn: &dyn DocTxn, _source: &Item, _target: &DocPath) -> RefsResult<()> {
        Err(RefsError::UnimplementedAction(self.name().to_string()))
    }
}

/// One unit of work run against a referenced record when a reference is
/// added or removed.
#[derive(Clone)]
pub enum RefAction {
    /// Array-union the source id into `target.<property>`.
    AppendId(String),
    /// Overwrite scalar `target.<property>` with the source id.
    SetId(String),
    /// Array-remove the source id from `target.<property>`.
    RemoveId(String),
    /// Set scalar `target.<property>` to null.
    UnsetId(String),
    /// Delete the target record, unwinding its references and search entry.
    DeleteItem,
    Custom(Arc<dyn ActionHandler>),
}

impl RefAction {
    pub fn custom(handler: impl ActionHandler + 'static) -> Self {
        Self::Custom(Arc::new(handler))
    }

    pub fn target_property(&self) -> Option<&str> {
        match self {
            Self::AppendId(property)
            | Self::SetId(property)
            | Self::RemoveId(property)
            | Self::UnsetId(property) => Some(property),
            Self::DeleteItem | Self::Custom(_) => None,
        }
    }

    /// Short label used in log events.
    pub fn label(&self) -> &str {
        match self {
            Self::AppendId(_) => "append_id",
            Self::SetId(_) => "set_id",
            Self::RemoveId(_) => "remove_id",
            Self::UnsetId(_) => "unset_id",
            Self::DeleteItem => "delete_item",
            Self::Custom(handler) => handler.name(),
        }
    }

    pub fn apply(&self, txn: &dyn DocTxn, source: &Item, target: &RefTarget<'_>) -> RefsResult<()> {
        let source_id = Value::String(source.id().to_string());
        let path = target.path();
        match self {
            Self::AppendId(property) => txn.set(
                &path,
                &Patch::new().with(property.as_str(), FieldWrite::ArrayUnion(vec![source_id])),
            )?,
            Self::SetId(property) => txn.set(
                &path,
                &Patch::new().with(property.as_str(), FieldWrite::Set(source_id)),
            )?,
            Self::RemoveId(property) => {
                if txn.read(&path)?.is_some() {
                    txn.set(
                        &path,
                        &Patch::new()
                            .with(property.as_str(), FieldWrite::ArrayRemove(vec![source_id])),
                    )?;
                }
            }
            Self::UnsetId(property) => {
                if txn.read(&path)?.is_some() {
                    txn.set(
                        &path,
                        &Patch::new().with(property.as_str(), FieldWrite::Set(Value::Null)),
                    )?;
                }
            }
            Self::DeleteItem => {
                target.delete(txn)?;
            }
            Self::Custom(handler) => handler.run(txn, source, &path)?,
        }
        Ok(())
    }
}

impl Debug for RefAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AppendId(property) => f.debug_tuple("AppendId").field(property).finish(),
            Self::SetId(property) => f.debug_tuple("SetId").field(property).finish(),
            Self::RemoveId(property) => f.debug_tuple("RemoveId").field(property).finish(),
            Self::UnsetId(property) => f.debug_tuple("UnsetId").field(property).finish(),
            Self::DeleteItem => f.write_str("DeleteItem"),
            Self::Custom(handler) => f.debug_tuple("Custom").field(&handler.name()).finish(),
        }
    }
}

impl PartialEq for RefAction {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::AppendId(a), Self::AppendId(b))
            | (Self::SetId(a), Self::SetId(b))
            | (Self::RemoveId(a), Self::RemoveId(b))
            | (Self::UnsetId(a), Self::UnsetId(b)) => a == b,
            (Self::DeleteItem, Self::DeleteItem) => true,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
