//! Field definitions for entities.

use serde::{Deserialize, Serialize};

use super::types::{FieldType, ScalarType};

/// A field definition within an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Property name.
    pub name: String,
    /// Field data type.
    pub field_type: FieldType,
    /// Whether the field is required (non-nullable at the application level).
    pub required: bool,
    /// Column name when it differs from the property name.
    pub column: Option<String>,
    /// Computed field definition if this is a derived field.
    pub computed: Option<ComputedField>,
    /// Stored encrypted; transparently decrypted on load.
    pub encrypted: bool,
}

/// Computed field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComputedField {
    /// Materialized: computed and stored on write.
    Materialized {
        /// Expression to compute the value.
        expression: String,
    },
    /// Virtual: computed on read, not stored.
    Virtual {
        /// Expression to compute the value.
        expression: String,
    },
}

impl FieldDef {
    /// Create a new required field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            column: None,
            computed: None,
            encrypted: false,
        }
    }

    /// Create an optional field (required = false).
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::new(name, field_type)
        }
    }

    /// Create an optional scalar field.
    pub fn optional_scalar(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::optional(name, FieldType::OptionalScalar(scalar))
    }

    /// Create a many-to-one association stored in a column named after it.
    pub fn reference(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::optional(name, FieldType::reference(entity))
    }

    /// Store the field in a differently named column.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Set as a computed field.
    pub fn computed(mut self, computed: ComputedField) -> Self {
        self.computed = Some(computed);
        self
    }

    /// Mark the field for transparent encryption.
    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    /// Check if this is a computed field.
    pub fn is_computed(&self) -> bool {
        self.computed.is_some()
    }

    /// Column holding this field, if it is stored on the owning table.
    ///
    /// Virtual computed fields and collection associations have none.
    pub fn column_name(&self) -> Option<&str> {
        if matches!(self.computed, Some(ComputedField::Virtual { .. })) {
            return None;
        }
        if !self.field_type.has_column() {
            return None;
        }
        Some(self.column.as_deref().unwrap_or(&self.name))
    }
}
