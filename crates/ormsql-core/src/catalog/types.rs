//! Core type definitions for the catalog.

use serde::{Deserialize, Serialize};

/// Scalar data types a column can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// Fixed-precision decimal.
    Decimal {
        /// Total number of digits.
        precision: u8,
        /// Number of digits after decimal point.
        scale: u8,
    },
    /// UTF-8 string.
    String,
    /// Binary data.
    Bytes,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
    /// UUID (128-bit identifier).
    Uuid,
}

/// What a property of an entity holds.
///
/// Scalars map to one column. `Reference` maps to one foreign-key column named
/// after the association. `Children` and `ManyReference` have no column on the
/// owning table; they are resolved through the other side or a bridge table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// A scalar value.
    Scalar(ScalarType),
    /// An optional scalar value (nullable).
    OptionalScalar(ScalarType),
    /// Many-to-one: this row stores the id of one `entity` row.
    Reference {
        /// Target entity type.
        entity: String,
    },
    /// One-to-many: `entity` rows point back here through `foreign_key`.
    Children {
        /// Child entity type.
        entity: String,
        /// Property on the child holding this row's id.
        foreign_key: String,
    },
    /// Many-to-many through a bridge table.
    ManyReference {
        /// Target entity type.
        entity: String,
        /// Bridge table name.
        bridge_table: String,
        /// Bridge column holding the owner's id.
        owner_column: String,
        /// Bridge column holding the target's id.
        target_column: String,
    },
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarType::Int32
                | ScalarType::Int64
                | ScalarType::Float32
                | ScalarType::Float64
                | ScalarType::Decimal { .. }
        )
    }

    /// Check if this type holds text.
    pub fn is_string(&self) -> bool {
        matches!(self, ScalarType::String)
    }
}

impl FieldType {
    /// Create a scalar field type.
    pub fn scalar(scalar: ScalarType) -> Self {
        FieldType::Scalar(scalar)
    }

    /// Create an optional scalar field type.
    pub fn optional_scalar(scalar: ScalarType) -> Self {
        FieldType::OptionalScalar(scalar)
    }

    /// Create a many-to-one association.
    pub fn reference(entity: impl Into<String>) -> Self {
        FieldType::Reference {
            entity: entity.into(),
        }
    }

    /// Create a one-to-many association.
    pub fn children(entity: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        FieldType::Children {
            entity: entity.into(),
            foreign_key: foreign_key.into(),
        }
    }

    /// Create a many-to-many association through a bridge table.
    pub fn many_reference(
        entity: impl Into<String>,
        bridge_table: impl Into<String>,
        owner_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        FieldType::ManyReference {
            entity: entity.into(),
            bridge_table: bridge_table.into(),
            owner_column: owner_column.into(),
            target_column: target_column.into(),
        }
    }

    /// Check if this type is nullable.
    pub fn is_nullable(&self) -> bool {
        matches!(self, FieldType::OptionalScalar(_) | FieldType::Reference { .. })
    }

    /// Check if this is an association to another entity.
    pub fn is_association(&self) -> bool {
        self.association_target().is_some()
    }

    /// The associated entity type, if any.
    pub fn association_target(&self) -> Option<&str> {
        match self {
            FieldType::Reference { entity }
            | FieldType::Children { entity, .. }
            | FieldType::ManyReference { entity, .. } => Some(entity),
            FieldType::Scalar(_) | FieldType::OptionalScalar(_) => None,
        }
    }

    /// Whether the property is stored in a column of the owning table.
    pub fn has_column(&self) -> bool {
        matches!(
            self,
            FieldType::Scalar(_) | FieldType::OptionalScalar(_) | FieldType::Reference { .. }
        )
    }

    /// Get the scalar type if this is a scalar or optional scalar.
    pub fn scalar_type(&self) -> Option<&ScalarType> {
        match self {
            FieldType::Scalar(s) | FieldType::OptionalScalar(s) => Some(s),
            _ => None,
        }
    }

    /// Check if this type holds text.
    pub fn is_string(&self) -> bool {
        self.scalar_type().is_some_and(ScalarType::is_string)
    }
}
