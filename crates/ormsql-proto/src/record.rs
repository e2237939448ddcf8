//! Dynamic entity rows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One loaded (or about to be saved) entity.
///
/// Identity is the pair `(entity, id)`: two records with the same type and
/// identifier describe the same logical row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity type name.
    pub entity: String,
    /// Identifier value.
    pub id: Value,
    /// Column values keyed by property name. Does not repeat the identifier.
    pub fields: BTreeMap<String, Value>,
}

impl EntityRecord {
    /// Create an empty record.
    pub fn new(entity: impl Into<String>, id: impl Into<Value>) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Set a field value (builder form).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a field value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Same type and identifier as `other`.
    pub fn same_identity(&self, other: &EntityRecord) -> bool {
        self.entity == other.entity && self.id == other.id
    }
}
