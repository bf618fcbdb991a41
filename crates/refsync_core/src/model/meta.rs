//! Property shape metadata.
//!
//! A property is either a scalar holding at most one referenced id, or an
//! array holding many. Reference targets are filled in by association
//! builders at model-definition time.

/// Storage shape of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Scalar,
    Array,
}

/// Element metadata of an array-valued property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrayType {
    pub ref_model: Option<String>,
}

/// Declared shape of one model property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMeta {
    pub kind: PropertyKind,
    /// Referenced model for scalar properties.
    pub ref_model: Option<String>,
    /// Present only for `PropertyKind::Array`.
    pub array_type: Option<ArrayType>,
}

impl PropertyMeta {
    pub fn scalar() -> Self {
        Self {
            kind: PropertyKind::Scalar,
            ref_model: None,
            array_type: None,
        }
    }

    pub fn array() -> Self {
        Self {
            kind: PropertyKind::Array,
            ref_model: None,
            array_type: Some(ArrayType::default()),
        }
    }

    pub fn is_array(&self) -> bool {
        self.kind == PropertyKind::Array
    }

    /// Returns the model that ids stored in this property point to.
    ///
    /// Array properties resolve through their element type; scalars use their
    /// own `ref_model`.
    pub fn reference_target(&self) -> Option<&str> {
        match self.kind {
            PropertyKind::Array => self
                .array_type
                .as_ref()
                .and_then(|element| element.ref_model.as_deref()),
            PropertyKind::Scalar => self.ref_model.as_deref(),
        }
    }

    /// Records `model` as the reference target, on the element type too for
    /// arrays.
    pub fn set_reference_target(&mut self, model: &str) {
        self.ref_model = Some(model.to_string());
        if self.kind == PropertyKind::Array {
            self.array_type
                .get_or_insert_with(ArrayType::default)
                .ref_model = Some(model.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PropertyMeta;

    #[test]
    fn array_reference_resolves_through_element_type() {
        let mut meta = PropertyMeta::array();
        assert_eq!(meta.reference_target(), None);

        meta.set_reference_target("books");
        assert_eq!(meta.reference_target(), Some("books"));
        assert_eq!(
            meta.array_type.as_ref().and_then(|t| t.ref_model.as_deref()),
            Some("books")
        );
    }

    #[test]
    fn scalar_reference_uses_own_ref_model() {
        let mut meta = PropertyMeta::scalar();
        meta.set_reference_target("authors");
        assert_eq!(meta.reference_target(), Some("authors"));
        assert!(meta.array_type.is_none());
    }
}
