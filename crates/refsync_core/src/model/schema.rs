//! Definition-time schema builder and the immutable schema it produces.
//!
//! # Responsibility
//! - Accumulate model descriptors, reference registries and search
//!   declarations while models are being defined.
//! - Validate every declaration against declared properties before the
//!   schema is shared with the lifecycle.
//!
//! # Invariants
//! - Model names and collections are non-empty and contain no `/`.
//! - Every tracked property of a built schema resolves to an existing model.
//! - A built `Schema` is never mutated.

use crate::model::descriptor::ModelDescriptor;
use crate::model::item::Item;
use crate::model::meta::PropertyMeta;
use crate::repo::document_repo::Document;
use log::info;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Configuration error raised while declaring models and relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    InvalidName(String),
    DuplicateModel(String),
    UnknownModel(String),
    UnknownProperty {
        model: String,
        property: String,
    },
    /// Deleting on removal is ambiguous when the reciprocal holds many ids.
    ArrayReciprocalDeleteOnRemove {
        model: String,
        property: String,
    },
    ExpectedArrayProperty {
        model: String,
        property: String,
    },
    UnresolvedReference {
        model: String,
        property: String,
    },
    InvalidItemId(String),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid model or collection name `{name}`"),
            Self::DuplicateModel(name) => write!(f, "model already defined: {name}"),
            Self::UnknownModel(name) => write!(f, "unknown model: {name}"),
            Self::UnknownProperty { model, property } => {
                write!(f, "unknown property `{property}` on model `{model}`")
            }
            Self::ArrayReciprocalDeleteOnRemove { model, property } => write!(
                f,
                "`{model}.{property}` is array-valued and cannot be combined with delete_on_remove"
            ),
            Self::ExpectedArrayProperty { model, property } => {
                write!(f, "`{model}.{property}` must be an array property")
            }
            Self::UnresolvedReference { model, property } => write!(
                f,
                "tracked property `{model}.{property}` has no resolvable reference model"
            ),
            Self::InvalidItemId(id) => write!(f, "invalid item id `{id}`"),
        }
    }
}

impl Error for SchemaError {}

/// Mutable accumulator used while models are being defined.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    models: BTreeMap<String, ModelDescriptor>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a model stored in `collection` with the given properties.
    pub fn define_model(
        &mut self,
        name: &str,
        collection: &str,
        properties: Vec<(&str, PropertyMeta)>,
    ) -> SchemaResult<()> {
        validate_name(name)?;
        validate_name(collection)?;
        if self.models.contains_key(name) {
            return Err(SchemaError::DuplicateModel(name.to_string()));
        }

        let mut model = ModelDescriptor::new(name, collection);
        for (property, meta) in properties {
            model.properties.insert(property.to_string(), meta);
        }
        self.models.insert(name.to_string(), model);
        Ok(())
    }

    /// Returns declared metadata for `model.property`.
    pub fn property(&self, model: &str, property: &str) -> SchemaResult<&PropertyMeta> {
        self.model(model)?
            .property(property)
            .ok_or_else(|| unknown_property(model, property))
    }

    pub fn model(&self, name: &str) -> SchemaResult<&ModelDescriptor> {
        self.models
            .get(name)
            .ok_or_else(|| SchemaError::UnknownModel(name.to_string()))
    }

    pub(crate) fn model_mut(&mut self, name: &str) -> SchemaResult<&mut ModelDescriptor> {
        self.models
            .get_mut(name)
            .ok_or_else(|| SchemaError::UnknownModel(name.to_string()))
    }

    pub(crate) fn property_mut(
        &mut self,
        model: &str,
        property: &str,
    ) -> SchemaResult<&mut PropertyMeta> {
        self.model_mut(model)?
            .properties
            .get_mut(property)
            .ok_or_else(|| unknown_property(model, property))
    }

    /// Marks properties whose presence in an update must run the
    /// transactional hook path.
    pub fn mark_triggers_update_txn(
        &mut self,
        model: &str,
        properties: &[&str],
        forces_full_update: bool,
    ) -> SchemaResult<()> {
        self.ensure_properties(model, properties)?;
        let descriptor = self.model_mut(model)?;
        for property in properties {
            descriptor.mark_trigger(property, forces_full_update);
        }
        Ok(())
    }

    pub(crate) fn ensure_properties(&self, model: &str, properties: &[&str]) -> SchemaResult<()> {
        let descriptor = self.model(model)?;
        for property in properties {
            if descriptor.property(property).is_none() {
                return Err(unknown_property(model, property));
            }
        }
        Ok(())
    }

    /// Validates all declarations and freezes the schema.
    pub fn build(self) -> SchemaResult<Schema> {
        for model in self.models.values() {
            for (property, meta) in &model.properties {
                if let Some(target) = meta.reference_target() {
                    if !self.models.contains_key(target) {
                        return Err(SchemaError::UnknownModel(format!(
                            "{target} (referenced by {}.{property})",
                            model.name
                        )));
                    }
                }
            }

            if let Some(registry) = model.refs() {
                for property in registry.tracked_properties() {
                    let meta = model
                        .property(property)
                        .ok_or_else(|| unknown_property(&model.name, property))?;
                    if meta.reference_target().is_none() {
                        return Err(SchemaError::UnresolvedReference {
                            model: model.name.clone(),
                            property: property.clone(),
                        });
                    }
                }
            }

            if let Some(search) = model.search() {
                for property in search.properties() {
                    if model.property(property).is_none() {
                        return Err(unknown_property(&model.name, property));
                    }
                }
            }
        }

        info!(
            "event=schema_build module=model status=ok models={} tracked_models={} indexed_models={}",
            self.models.len(),
            self.models.values().filter(|m| m.refs.is_some()).count(),
            self.models.values().filter(|m| m.search.is_some()).count()
        );

        Ok(Schema {
            models: self
                .models
                .into_iter()
                .map(|(name, model)| (name, Arc::new(model)))
                .collect(),
        })
    }
}

/// Frozen set of model descriptors shared by the lifecycle and hooks.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: BTreeMap<String, Arc<ModelDescriptor>>,
}

impl Schema {
    pub fn model(&self, name: &str) -> SchemaResult<Arc<ModelDescriptor>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownModel(name.to_string()))
    }

    /// Wraps an already persisted record.
    pub fn item(&self, model: &str, id: &str, state: Document) -> SchemaResult<Item> {
        validate_item_id(id)?;
        Ok(Item::new(self.model(model)?, id, state))
    }

    /// Creates a local-only record with a generated id.
    pub fn create_item(&self, model: &str, state: Document) -> SchemaResult<Item> {
        let id = Uuid::new_v4().to_string();
        Ok(Item::local(self.model(model)?, id, state))
    }

    /// Creates a local-only record with a caller-provided id.
    pub fn create_item_with_id(
        &self,
        model: &str,
        id: &str,
        state: Document,
    ) -> SchemaResult<Item> {
        validate_item_id(id)?;
        Ok(Item::local(self.model(model)?, id, state))
    }
}

fn unknown_property(model: &str, property: &str) -> SchemaError {
    SchemaError::UnknownProperty {
        model: model.to_string(),
        property: property.to_string(),
    }
}

fn validate_name(value: &str) -> SchemaResult<()> {
    if value.trim().is_empty() || value.contains('/') {
        return Err(SchemaError::InvalidName(value.to_string()));
    }
    Ok(())
}

fn validate_item_id(id: &str) -> SchemaResult<()> {
    if id.trim().is_empty() || id.contains('/') {
        return Err(SchemaError::InvalidItemId(id.to_string()));
    }
    Ok(())
}
