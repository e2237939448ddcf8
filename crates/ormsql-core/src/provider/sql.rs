//! SQL-backed data provider.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use ormsql_proto::{EntityRecord, Query, Value};
use tracing::{debug, instrument};

use super::DataProvider;
use crate::catalog::EntityDef;
use crate::context::DbContext;
use crate::error::Error;
use crate::sql::{SqlCommand, SqlDialect, SqlGenerator, SqlParameter, SubqueryMapper};

/// One result row: column name to value.
pub type Row = BTreeMap<String, Value>;

/// Runs generated statements against a database.
///
/// This is the seam to the driver (connection pooling, transactions and
/// type mapping live behind it).
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a query and return its rows.
    async fn query(&self, context: &DbContext, command: &SqlCommand) -> Result<Vec<Row>, Error>;

    /// Run a query returning a single value.
    async fn scalar(&self, context: &DbContext, command: &SqlCommand) -> Result<Value, Error>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, context: &DbContext, command: &SqlCommand) -> Result<u64, Error>;
}

/// Data provider that generates SQL and hands it to an executor.
#[derive(Clone)]
pub struct SqlDataProvider {
    generator: SqlGenerator,
    executor: Arc<dyn SqlExecutor>,
}

impl SqlDataProvider {
    /// Create a provider.
    pub fn new(generator: SqlGenerator, executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            generator,
            executor,
        }
    }

    /// The generator in use.
    pub fn generator(&self) -> &SqlGenerator {
        &self.generator
    }

    fn entity(&self, name: &str) -> Result<Arc<EntityDef>, Error> {
        self.generator.catalog().get(name)
    }

    /// Map a result row onto a record.
    ///
    /// Columns are renamed back to property names; unknown columns are kept
    /// under their own name.
    fn parse_row(&self, entity: &EntityDef, mut row: Row) -> Result<EntityRecord, Error> {
        let id = row.remove(entity.identity_column()).ok_or_else(|| {
            Error::Provider(format!(
                "`{}` row is missing identity column `{}`",
                entity.name,
                entity.identity_column()
            ))
        })?;

        let mut record = EntityRecord::new(entity.name.clone(), id);
        for field in entity.stored_fields() {
            if let Some(column) = field.column_name() {
                if let Some(value) = row.remove(column) {
                    record.fields.insert(field.name.clone(), value);
                }
            }
        }
        record.fields.extend(row);
        Ok(record)
    }
}

#[async_trait]
impl DataProvider for SqlDataProvider {
    #[instrument(skip_all, fields(entity = %query.entity))]
    async fn get_list(
        &self,
        query: &Query,
        context: &DbContext,
    ) -> Result<Vec<EntityRecord>, Error> {
        let entity = self.entity(&query.entity)?;
        let command = self.generator.generate_select(query)?;
        let rows = self.executor.query(context, &command).await?;
        debug!(database = %context.database, rows = rows.len(), "loaded rows");
        rows.into_iter()
            .map(|row| self.parse_row(&entity, row))
            .collect()
    }

    #[instrument(skip_all, fields(entity = %query.entity))]
    async fn count(&self, query: &Query, context: &DbContext) -> Result<u64, Error> {
        let command = self.generator.generate_count(query)?;
        let value = self.executor.scalar(context, &command).await?;
        value
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| Error::Provider(format!("count returned non-integer `{value}`")))
    }

    async fn insert(&self, record: &EntityRecord, context: &DbContext) -> Result<u64, Error> {
        let entity = self.entity(&record.entity)?;
        let command = self.generator.generate_insert(&entity, record)?;
        self.executor.execute(context, &command).await
    }

    async fn update(&self, record: &EntityRecord, context: &DbContext) -> Result<u64, Error> {
        let entity = self.entity(&record.entity)?;
        let command = self.generator.generate_update(&entity, record)?;
        self.executor.execute(context, &command).await
    }

    async fn delete(&self, record: &EntityRecord, context: &DbContext) -> Result<u64, Error> {
        let entity = self.entity(&record.entity)?;
        let command = self.generator.generate_delete(&entity, record)?;
        self.executor.execute(context, &command).await
    }

    fn map_subquery(
        &self,
        entity: &str,
        owner_alias: &str,
        segment: &str,
        alias: &str,
    ) -> Result<String, Error> {
        self.generator.map_segment(entity, owner_alias, segment, alias)
    }

    fn generate_parameter(&self, name: &str, value: Value) -> SqlParameter {
        SqlParameter {
            name: name.to_string(),
            sql_type: self.generator.dialect().parameter_type(&value),
            value,
        }
    }

    fn dialect(&self) -> &dyn SqlDialect {
        self.generator.dialect()
    }

    fn route_subqueries(&self, routes: Weak<dyn SubqueryMapper + Send + Sync>) {
        self.generator.route_subqueries(routes);
    }
}
