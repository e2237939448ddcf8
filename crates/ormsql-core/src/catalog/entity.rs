//! Entity definitions.

use ormsql_proto::OrderSpec;
use serde::{Deserialize, Serialize};

use super::field::FieldDef;
use super::types::{FieldType, ScalarType};

/// Property every soft-deleting entity carries.
pub const SOFT_DELETE_FIELD: &str = "IsMarkedSoftDeleted";

/// Suffix that lets callers filter on an association by its foreign-key name.
const FOREIGN_KEY_SUFFIX: &str = "Id";

/// An entity definition: one mapped type and its table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name (unique within its namespace).
    pub name: String,
    /// Optional namespace; part of the qualified name used in cache keys.
    pub namespace: Option<String>,
    /// Table the entity is stored in.
    pub table: String,
    /// Alias used for the table in generated SQL.
    pub alias: String,
    /// Name of the primary identity field.
    pub identity_field: String,
    /// Field definitions.
    pub fields: Vec<FieldDef>,
    /// Lifecycle rules.
    pub lifecycle: LifecycleRules,
    /// Field holding the optimistic-concurrency row version, if any.
    pub row_version_field: Option<String>,
    /// Concrete types implementing this one. Non-empty means abstract.
    pub implementations: Vec<String>,
}

/// Lifecycle rules for an entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LifecycleRules {
    /// Rows are flagged instead of deleted and hidden from queries.
    pub soft_delete: bool,
    /// Default ordering for queries without explicit order.
    pub default_order: Option<Vec<OrderSpec>>,
}

impl EntityDef {
    /// Create a new entity definition stored in a table of the same name.
    pub fn new(name: impl Into<String>, identity_field: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table: name.clone(),
            alias: name.clone(),
            name,
            namespace: None,
            identity_field: identity_field.into(),
            fields: Vec::new(),
            lifecycle: LifecycleRules::default(),
            row_version_field: None,
            implementations: Vec::new(),
        }
    }

    /// Place the entity in a namespace.
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the SQL alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Enable soft delete, adding the flag field if it is not declared.
    pub fn with_soft_delete(mut self) -> Self {
        self.lifecycle.soft_delete = true;
        if self.get_field(SOFT_DELETE_FIELD).is_none() {
            self.fields
                .push(FieldDef::new(SOFT_DELETE_FIELD, FieldType::scalar(ScalarType::Bool)));
        }
        self
    }

    /// Set the default ordering.
    pub fn with_default_order(mut self, order: Vec<OrderSpec>) -> Self {
        self.lifecycle.default_order = Some(order);
        self
    }

    /// Use `field` as the optimistic-concurrency row version.
    pub fn with_row_version(mut self, field: impl Into<String>) -> Self {
        self.row_version_field = Some(field.into());
        self
    }

    /// Declare the concrete types implementing this (abstract) type.
    pub fn with_implementations(
        mut self,
        implementations: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.implementations = implementations.into_iter().map(Into::into).collect();
        self
    }

    /// Namespace-qualified type name.
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Whether queries on this type fan out to implementations.
    pub fn is_abstract(&self) -> bool {
        !self.implementations.is_empty()
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get the identity field definition.
    pub fn get_identity_field(&self) -> Option<&FieldDef> {
        self.get_field(&self.identity_field)
    }

    /// Column holding the identifier.
    pub fn identity_column(&self) -> &str {
        self.get_identity_field()
            .and_then(FieldDef::column_name)
            .unwrap_or(&self.identity_field)
    }

    /// Column a property filters or sorts on.
    ///
    /// `CustomerId` resolves to the column of the `Customer` association when
    /// such a non-computed reference exists.
    pub fn column_for(&self, property: &str) -> Option<&str> {
        if let Some(base) = property.strip_suffix(FOREIGN_KEY_SUFFIX) {
            if let Some(field) = self.get_field(base) {
                if matches!(field.field_type, FieldType::Reference { .. }) && !field.is_computed() {
                    return field.column_name();
                }
            }
        }
        if property == self.identity_field {
            return Some(self.identity_column());
        }
        self.get_field(property).and_then(FieldDef::column_name)
    }

    /// Fields stored on the owning table, excluding the identifier.
    pub fn stored_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|f| f.name != self.identity_field && f.column_name().is_some())
    }

    /// Fields marked for encryption.
    pub fn encrypted_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.encrypted)
    }

    /// Check if this entity has soft delete enabled.
    pub fn has_soft_delete(&self) -> bool {
        self.lifecycle.soft_delete
    }

    /// Ordering applied when a query specifies none.
    pub fn natural_order(&self) -> Vec<OrderSpec> {
        self.lifecycle
            .default_order
            .clone()
            .unwrap_or_else(|| vec![OrderSpec::asc(self.identity_field.clone())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ComputedField;

    fn order() -> EntityDef {
        EntityDef::new("Order", "ID")
            .in_namespace("Shop")
            .with_table("Orders")
            .with_alias("O")
            .with_field(FieldDef::new("ID", FieldType::scalar(ScalarType::Int64)))
            .with_field(FieldDef::reference("Customer", "Customer"))
            .with_field(FieldDef::new("Total", FieldType::scalar(ScalarType::Int64)))
            .with_field(FieldDef::new("Lines", FieldType::children("OrderLine", "Order")))
    }

    #[test]
    fn test_entity_builder() {
        let entity = order().with_soft_delete();

        assert_eq!(entity.name, "Order");
        assert_eq!(entity.qualified_name(), "Shop.Order");
        assert_eq!(entity.table, "Orders");
        assert_eq!(entity.alias, "O");
        assert!(entity.has_soft_delete());
        assert!(entity.get_field(SOFT_DELETE_FIELD).is_some());
        assert!(!entity.is_abstract());
    }

    #[test]
    fn test_soft_delete_field_not_duplicated() {
        let entity = order()
            .with_field(FieldDef::new(SOFT_DELETE_FIELD, FieldType::scalar(ScalarType::Bool)))
            .with_soft_delete();
        let count = entity
            .fields
            .iter()
            .filter(|f| f.name == SOFT_DELETE_FIELD)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_column_for_foreign_key_sugar() {
        let entity = order();

        assert_eq!(entity.column_for("CustomerId"), Some("Customer"));
        assert_eq!(entity.column_for("Customer"), Some("Customer"));
        assert_eq!(entity.column_for("ID"), Some("ID"));
        assert_eq!(entity.column_for("Lines"), None);
        assert_eq!(entity.column_for("Missing"), None);
    }

    #[test]
    fn test_foreign_key_sugar_skips_computed() {
        let entity = EntityDef::new("Order", "ID").with_field(
            FieldDef::reference("Customer", "Customer").computed(ComputedField::Virtual {
                expression: "lookup".into(),
            }),
        );
        assert_eq!(entity.column_for("CustomerId"), None);
    }

    #[test]
    fn test_stored_fields() {
        let order = order();
        let names: Vec<_> = order.stored_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Customer", "Total"]);
    }

    #[test]
    fn test_natural_order() {
        assert_eq!(order().natural_order(), vec![OrderSpec::asc("ID")]);

        let sorted = order().with_default_order(vec![OrderSpec::desc("Total")]);
        assert_eq!(sorted.natural_order(), vec![OrderSpec::desc("Total")]);
    }

    #[test]
    fn test_abstract_entity() {
        let contact = EntityDef::new("Contact", "ID").with_implementations(["Person", "Company"]);
        assert!(contact.is_abstract());
        assert_eq!(contact.implementations, vec!["Person", "Company"]);
    }
}
