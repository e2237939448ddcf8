//! Resolution of dotted property paths into correlated subqueries.
//!
//! A criterion on `Customer.Address.City` against `Order` becomes
//!
//! ```text
//! EXISTS (SELECT 1 FROM [Customers] AS O_Customer WHERE ... AND
//!   EXISTS (SELECT 1 FROM [Addresses] AS O_Customer_Address WHERE ... AND
//!     O_Customer_Address.[City] = @City))
//! ```
//!
//! Each hop gets an alias made of its parent's alias and the segment name, so
//! aliases stay unique however deep the path goes.

use std::sync::Arc;

use tracing::trace;

use ormsql_proto::Value;

use super::params::SqlParameter;
use crate::catalog::{Catalog, EntityDef, FieldDef};
use crate::error::Error;

/// Produces the SQL of one association hop on behalf of the owning type.
pub trait SubqueryMapper {
    /// Opening fragment of a correlated subquery for one hop.
    ///
    /// The fragment must be left open (no closing parenthesis); the resolver
    /// closes every level once the leaf condition is in place.
    fn map_subquery(
        &self,
        owner: &EntityDef,
        owner_alias: &str,
        association: &FieldDef,
        target: &EntityDef,
        alias: &str,
    ) -> Result<String, Error>;

    /// A typed parameter for a condition on a property of `owner`.
    fn generate_parameter(
        &self,
        owner: &EntityDef,
        name: &str,
        value: Value,
    ) -> Result<SqlParameter, Error>;
}

/// A path resolved down to its leaf property.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    /// Opening fragments, outermost first.
    pub subqueries: Vec<String>,
    /// Target type and alias of every hop, parallel to `subqueries`.
    pub hops: Vec<(Arc<EntityDef>, String)>,
    /// Entity declaring the leaf property.
    pub entity: Arc<EntityDef>,
    /// Alias of the innermost subquery.
    pub alias: String,
    /// Leaf property name.
    pub property: String,
}

impl ResolvedPath {
    /// Nest `condition` inside every subquery and close them innermost first.
    pub fn wrap(&self, condition: &str) -> String {
        let mut sql = String::new();
        for subquery in &self.subqueries {
            sql.push_str(subquery);
            sql.push_str(" AND ");
        }
        sql.push_str(condition);
        for _ in &self.subqueries {
            sql.push(')');
        }
        sql
    }
}

/// Walks association paths through the catalog.
pub struct NestedPathResolver<'a> {
    catalog: &'a Catalog,
    mapper: &'a dyn SubqueryMapper,
}

impl<'a> NestedPathResolver<'a> {
    pub fn new(catalog: &'a Catalog, mapper: &'a dyn SubqueryMapper) -> Self {
        Self { catalog, mapper }
    }

    /// Resolve `path` starting at `root`, aliased as `root_alias`.
    ///
    /// Every segment but the last must be an association; the last is
    /// returned as the leaf property and is not checked here.
    pub fn resolve(
        &self,
        root: Arc<EntityDef>,
        root_alias: &str,
        path: &str,
    ) -> Result<ResolvedPath, Error> {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((leaf, hops)) = segments.split_last() else {
            return Err(Error::unknown_property(&root.name, path));
        };
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::unknown_property(&root.name, path));
        }

        let mut entity = root;
        let mut alias = root_alias.to_string();
        let mut subqueries = Vec::with_capacity(hops.len());
        let mut resolved_hops = Vec::with_capacity(hops.len());

        for segment in hops {
            let (field, target) = self.catalog.association(&entity, segment)?;
            let next_alias = format!("{alias}_{segment}");
            subqueries.push(
                self.mapper
                    .map_subquery(&entity, &alias, &field, &target, &next_alias)?,
            );
            trace!(segment = %segment, alias = %next_alias, "resolved path segment");
            resolved_hops.push((target.clone(), next_alias.clone()));
            entity = target;
            alias = next_alias;
        }

        Ok(ResolvedPath {
            subqueries,
            hops: resolved_hops,
            entity,
            alias,
            property: leaf.to_string(),
        })
    }
}
