//! Reference id normalization and set differences.

use crate::refs::{RefsError, RefsResult};
use serde_json::Value;
use std::collections::BTreeSet;

/// Normalizes a property value to the ids it references.
///
/// Absent and null read as no ids, a scalar as one id, an array as its
/// elements. Null array elements are skipped; integers are accepted as ids.
pub fn ref_ids(property: &str, value: Option<&Value>) -> RefsResult<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(elements)) => {
            let mut ids = Vec::with_capacity(elements.len());
            for element in elements {
                if let Some(id) = scalar_id(property, element)? {
                    ids.push(id);
                }
            }
            Ok(ids)
        }
        Some(scalar) => Ok(scalar_id(property, scalar)?.into_iter().collect()),
    }
}

fn scalar_id(property: &str, value: &Value) -> RefsResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(id) if !id.is_empty() => Ok(Some(id.clone())),
        Value::Number(number) if number.is_i64() || number.is_u64() => {
            Ok(Some(number.to_string()))
        }
        other => Err(RefsError::InvalidReference {
            property: property.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Ids that entered and left a tracked property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefDelta {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl RefDelta {
    /// `added = new - old`, `removed = old - new`, ignoring positions and
    /// duplicates.
    pub fn between(old: &[String], new: &[String]) -> Self {
        let old: BTreeSet<&String> = old.iter().collect();
        let new: BTreeSet<&String> = new.iter().collect();
        Self {
            added: new.difference(&old).map(|id| (*id).clone()).collect(),
            removed: old.difference(&new).map(|id| (*id).clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
