//! In-process entity registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::entity::EntityDef;
use super::field::FieldDef;
use crate::error::Error;

/// Registry of mapped entity types, keyed by entity name.
///
/// Definitions are immutable once registered; lookups hand out shared
/// `Arc<EntityDef>`s so the generator and the engine never copy them.
#[derive(Debug, Default)]
pub struct Catalog {
    entities: RwLock<HashMap<String, Arc<EntityDef>>>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a set of definitions and validate cross-references.
    pub fn with_entities(entities: impl IntoIterator<Item = EntityDef>) -> Result<Self, Error> {
        let catalog = Self::new();
        for entity in entities {
            catalog.register(entity)?;
        }
        catalog.validate()?;
        Ok(catalog)
    }

    /// Register an entity type.
    pub fn register(&self, entity: EntityDef) -> Result<(), Error> {
        if entity.identity_field.is_empty() {
            return Err(Error::Configuration(format!(
                "entity `{}` has no identity field",
                entity.name
            )));
        }
        if let Some(version) = &entity.row_version_field {
            if entity.get_field(version).is_none() {
                return Err(Error::Configuration(format!(
                    "row version field `{version}` is not declared on `{}`",
                    entity.name
                )));
            }
        }

        let mut entities = self.entities.write();
        if entities.contains_key(&entity.name) {
            return Err(Error::Configuration(format!(
                "entity `{}` is already registered",
                entity.name
            )));
        }
        debug!(entity = %entity.name, table = %entity.table, "registered entity");
        entities.insert(entity.name.clone(), Arc::new(entity));
        Ok(())
    }

    /// Check that every association and implementation names a registered type.
    pub fn validate(&self) -> Result<(), Error> {
        let entities = self.entities.read();
        for entity in entities.values() {
            for target in entity.implementations.iter() {
                if !entities.contains_key(target) {
                    return Err(Error::Configuration(format!(
                        "`{}` lists unknown implementation `{target}`",
                        entity.name
                    )));
                }
            }
            for field in entity.fields.iter() {
                if let Some(target) = field.field_type.association_target() {
                    if !entities.contains_key(target) {
                        return Err(Error::Configuration(format!(
                            "`{}.{}` references unknown entity `{target}`",
                            entity.name, field.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Get an entity definition.
    pub fn get(&self, name: &str) -> Result<Arc<EntityDef>, Error> {
        self.try_get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Get an entity definition if registered.
    pub fn try_get(&self, name: &str) -> Option<Arc<EntityDef>> {
        self.entities.read().get(name).cloned()
    }

    /// Check if an entity type is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entities.read().contains_key(name)
    }

    /// List registered entity names, sorted.
    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve an association property to its field and target type.
    pub fn association(
        &self,
        entity: &EntityDef,
        property: &str,
    ) -> Result<(FieldDef, Arc<EntityDef>), Error> {
        let field = entity
            .get_field(property)
            .ok_or_else(|| Error::unknown_property(&entity.name, property))?;
        let target = field.field_type.association_target().ok_or_else(|| {
            Error::Usage(format!(
                "`{}.{property}` is not an association",
                entity.name
            ))
        })?;
        Ok((field.clone(), self.get(target)?))
    }

    /// Concrete types serving queries on `name`, flattening nested abstractions.
    pub fn concrete_types(&self, name: &str) -> Result<Vec<Arc<EntityDef>>, Error> {
        let mut out = Vec::new();
        let mut pending = vec![self.get(name)?];
        while let Some(entity) = pending.pop() {
            if entity.is_abstract() {
                for implementation in entity.implementations.iter().rev() {
                    pending.push(self.get(implementation)?);
                }
            } else if !out.iter().any(|e: &Arc<EntityDef>| e.name == entity.name) {
                out.push(entity);
            }
        }
        Ok(out)
    }

    /// Abstract types that (directly or transitively) include `name`.
    pub fn abstract_parents(&self, name: &str) -> Vec<Arc<EntityDef>> {
        let entities = self.entities.read();
        let mut parents: Vec<Arc<EntityDef>> = Vec::new();
        let mut frontier = vec![name.to_string()];
        while let Some(child) = frontier.pop() {
            for entity in entities.values() {
                if entity.implementations.iter().any(|i| *i == child)
                    && !parents.iter().any(|p| p.name == entity.name)
                {
                    frontier.push(entity.name.clone());
                    parents.push(entity.clone());
                }
            }
        }
        parents.sort_by(|a, b| a.name.cmp(&b.name));
        parents
    }
}
