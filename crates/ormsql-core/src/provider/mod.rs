//! Data providers: per-entity access to the backing store.
//!
//! The engine talks to a [`DataProvider`] per entity type, looked up through
//! the [`ProviderRegistry`]. [`SqlDataProvider`] is the SQL implementation; it
//! generates statements with a [`SqlGenerator`](crate::sql::SqlGenerator) and
//! runs them through a [`SqlExecutor`], the seam to the actual driver.

mod registry;
mod sql;

use std::sync::Weak;

use async_trait::async_trait;
use ormsql_proto::{EntityRecord, Query, Value};

use crate::context::DbContext;
use crate::error::Error;
use crate::sql::{SqlDialect, SqlParameter, SubqueryMapper};

pub use registry::{ProviderRegistry, ProviderTarget};
pub use sql::{Row, SqlDataProvider, SqlExecutor};

/// Loads and writes rows of one or more entity types.
///
/// Rows come back in their persisted form; decryption and identity-map
/// reconciliation happen in the engine.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Rows matching `query`.
    async fn get_list(&self, query: &Query, context: &DbContext)
        -> Result<Vec<EntityRecord>, Error>;

    /// Number of rows matching `query`.
    async fn count(&self, query: &Query, context: &DbContext) -> Result<u64, Error>;

    /// Insert a row. Returns the number of affected rows.
    async fn insert(&self, record: &EntityRecord, context: &DbContext) -> Result<u64, Error>;

    /// Update a row. Returns the number of affected rows.
    async fn update(&self, record: &EntityRecord, context: &DbContext) -> Result<u64, Error>;

    /// Delete a row. Returns the number of affected rows.
    async fn delete(&self, record: &EntityRecord, context: &DbContext) -> Result<u64, Error>;

    /// Opening subquery fragment for the association `segment` of `entity`.
    fn map_subquery(
        &self,
        entity: &str,
        owner_alias: &str,
        segment: &str,
        alias: &str,
    ) -> Result<String, Error>;

    /// A typed parameter for `value`.
    fn generate_parameter(&self, name: &str, value: Value) -> SqlParameter;

    /// SQL dialect spoken by this provider.
    fn dialect(&self) -> &dyn SqlDialect;

    /// Render association hops of dotted criteria through `routes`, which
    /// hands each hop to the provider owning it.
    ///
    /// Providers that do not generate SQL ignore this.
    fn route_subqueries(&self, _routes: Weak<dyn SubqueryMapper + Send + Sync>) {}
}
