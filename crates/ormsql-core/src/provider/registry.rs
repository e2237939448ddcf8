//! Entity-to-provider routing.

use std::collections::HashMap;
use std::sync::Arc;

use ormsql_proto::Value;

use super::DataProvider;
use crate::catalog::{Catalog, EntityDef, FieldDef};
use crate::error::Error;
use crate::sql::{SqlParameter, SubqueryMapper};

/// Where a query on an entity type goes.
pub enum ProviderTarget {
    /// A concrete type served by one provider.
    Single(Arc<dyn DataProvider>),
    /// An abstract type: one provider per concrete implementation.
    FanOut(Vec<(Arc<EntityDef>, Arc<dyn DataProvider>)>),
}

/// Maps entity types to the providers serving them.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn DataProvider>>,
    fallback: Option<Arc<dyn DataProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one entity type to `provider`.
    pub fn register(&mut self, entity: impl Into<String>, provider: Arc<dyn DataProvider>) {
        self.providers.insert(entity.into(), provider);
    }

    /// Serve every type without an explicit route from `provider`.
    pub fn set_fallback(&mut self, provider: Arc<dyn DataProvider>) {
        self.fallback = Some(provider);
    }

    /// Provider for a concrete type.
    pub fn provider_for(&self, entity: &str) -> Result<Arc<dyn DataProvider>, Error> {
        self.providers
            .get(entity)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| Error::NoProvider(entity.to_string()))
    }

    /// Every registered provider, the fallback last.
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn DataProvider>> {
        self.providers.values().chain(self.fallback.iter())
    }

    /// Resolve the providers for `entity`, flattening abstract types.
    pub fn resolve(&self, catalog: &Catalog, entity: &EntityDef) -> Result<ProviderTarget, Error> {
        if !entity.is_abstract() {
            return Ok(ProviderTarget::Single(self.provider_for(&entity.name)?));
        }
        let mut targets = Vec::new();
        for concrete in catalog.concrete_types(&entity.name)? {
            let provider = self.provider_for(&concrete.name)?;
            targets.push((concrete, provider));
        }
        if targets.is_empty() {
            return Err(Error::NoProvider(entity.name.clone()));
        }
        Ok(ProviderTarget::FanOut(targets))
    }
}

/// Hops of a dotted path are rendered by the provider serving the type that
/// owns the association, which may differ from the one serving the root.
impl SubqueryMapper for ProviderRegistry {
    fn map_subquery(
        &self,
        owner: &EntityDef,
        owner_alias: &str,
        association: &FieldDef,
        _target: &EntityDef,
        alias: &str,
    ) -> Result<String, Error> {
        self.provider_for(&owner.name)?
            .map_subquery(&owner.name, owner_alias, &association.name, alias)
    }

    fn generate_parameter(
        &self,
        owner: &EntityDef,
        name: &str,
        value: Value,
    ) -> Result<SqlParameter, Error> {
        Ok(self.provider_for(&owner.name)?.generate_parameter(name, value))
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<&String> = self.providers.keys().collect();
        routes.sort();
        f.debug_struct("ProviderRegistry")
            .field("routes", &routes)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
