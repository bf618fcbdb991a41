//! Declarative relation builders layered on `track_refs`.
//!
//! # Responsibility
//! - Translate one-to-one, one-to-many and many-to-many declarations into
//!   reference registry entries on both sides.
//! - Record the referenced model on the tracked property's metadata.
//!
//! # Invariants
//! - An array reciprocal is never combined with `delete_on_remove`.
//! - Reciprocal registration never recurses more than once.

use crate::model::schema::{SchemaBuilder, SchemaError, SchemaResult};
use crate::refs::action::RefAction;
use log::info;

/// Shape of a relation derived from both sides' property metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Scalar without reciprocal.
    Unidirectional,
    OneToOne,
    /// Scalar whose reciprocal is an array.
    OneToMany,
    /// Array whose reciprocal is a scalar.
    ManyToOneInverse,
    ManyToMany,
    /// Array without reciprocal.
    UnidirectionalMany,
}

impl Cardinality {
    fn derive(is_array: bool, reciprocal_is_array: Option<bool>) -> Self {
        match (is_array, reciprocal_is_array) {
            (false, None) => Self::Unidirectional,
            (false, Some(false)) => Self::OneToOne,
            (false, Some(true)) => Self::OneToMany,
            (true, Some(false)) => Self::ManyToOneInverse,
            (true, Some(true)) => Self::ManyToMany,
            (true, None) => Self::UnidirectionalMany,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unidirectional => "unidirectional",
            Self::OneToOne => "one_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToOneInverse => "many_to_one_inverse",
            Self::ManyToMany => "many_to_many",
            Self::UnidirectionalMany => "unidirectional_many",
        }
    }
}

impl SchemaBuilder {
    /// Declares that `model1.prop1` references `model2`, optionally mirrored
    /// by `model2.prop2`.
    ///
    /// With `delete_on_remove`, removing a reference deletes the referenced
    /// record. Unless `no_recurse`, the reciprocal side is registered too with
    /// roles swapped.
    pub fn connect(
        &mut self,
        model1: &str,
        prop1: &str,
        model2: &str,
        prop2: Option<&str>,
        delete_on_remove: bool,
        no_recurse: bool,
    ) -> SchemaResult<Cardinality> {
        let is_array = self.property(model1, prop1)?.is_array();
        self.model(model2)?;
        let reciprocal_is_array = match prop2 {
            Some(prop2) => Some(self.property(model2, prop2)?.is_array()),
            None => None,
        };

        if delete_on_remove && reciprocal_is_array == Some(true) {
            return Err(SchemaError::ArrayReciprocalDeleteOnRemove {
                model: model2.to_string(),
                property: prop2.unwrap_or_default().to_string(),
            });
        }

        let mut add_actions = Vec::new();
        let mut remove_actions = Vec::new();
        if let Some(prop2) = prop2 {
            if reciprocal_is_array == Some(true) {
                add_actions.push(RefAction::AppendId(prop2.to_string()));
            } else {
                add_actions.push(RefAction::SetId(prop2.to_string()));
            }
        }
        if delete_on_remove {
            remove_actions.push(RefAction::DeleteItem);
        } else if let Some(prop2) = prop2 {
            if reciprocal_is_array == Some(true) {
                remove_actions.push(RefAction::RemoveId(prop2.to_string()));
            } else {
                remove_actions.push(RefAction::UnsetId(prop2.to_string()));
            }
        }

        self.property_mut(model1, prop1)?.set_reference_target(model2);
        self.track_refs(model1, &[prop1], add_actions, remove_actions)?;

        let cardinality = Cardinality::derive(is_array, reciprocal_is_array);
        info!(
            "event=connect module=refs status=ok model={} property={} target_model={} cardinality={} delete_on_remove={}",
            model1,
            prop1,
            model2,
            cardinality.label(),
            delete_on_remove
        );

        if let (Some(prop2), false) = (prop2, no_recurse) {
            self.connect(model2, prop2, model1, Some(prop1), false, true)?;
        }
        Ok(cardinality)
    }

    /// Declares that ids in array `model1.prop1` are `model2` records owned by
    /// `model1` through scalar `model2.prop2`.
    ///
    /// Adding an id sets the owner; removing it either deletes the record or
    /// clears the owner.
    pub fn belongs_to_many(
        &mut self,
        model1: &str,
        prop1: &str,
        model2: &str,
        prop2: &str,
        delete_on_remove: bool,
    ) -> SchemaResult<()> {
        if !self.property(model1, prop1)?.is_array() {
            return Err(SchemaError::ExpectedArrayProperty {
                model: model1.to_string(),
                property: prop1.to_string(),
            });
        }
        self.property(model2, prop2)?;

        let add_actions = vec![RefAction::SetId(prop2.to_string())];
        let remove_actions = if delete_on_remove {
            vec![RefAction::DeleteItem]
        } else {
            vec![RefAction::UnsetId(prop2.to_string())]
        };

        self.property_mut(model1, prop1)?.set_reference_target(model2);
        self.track_refs(model1, &[prop1], add_actions, remove_actions)?;

        info!(
            "event=belongs_to_many module=refs status=ok model={} property={} target_model={} delete_on_remove={}",
            model1, prop1, model2, delete_on_remove
        );
        Ok(())
    }
}
