//! Criterion-to-SQL translation.

use std::sync::{Arc, Weak};

use ormsql_proto::{
    Criterion, EntityRecord, FilterFunction, OrderDirection, OrderSpec, Query, RawCriterion,
    SimpleCriterion, Value,
};
use parking_lot::RwLock;
use tracing::debug;

use super::dialect::SqlDialect;
use super::nested::{NestedPathResolver, SubqueryMapper};
use super::params::{Parameters, SqlParameter};
use super::postgres::PostgresDialect;
use super::sqlserver::SqlServerDialect;
use crate::catalog::{Catalog, EntityDef, FieldDef, FieldType, SOFT_DELETE_FIELD};
use crate::error::Error;

/// A generated statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlCommand {
    /// SQL text with named parameter references.
    pub sql: String,
    /// Parameters in binding order.
    pub parameters: Parameters,
}

/// Hop mapper shared with the engine, held weakly.
type Routes = Arc<RwLock<Option<Weak<dyn SubqueryMapper + Send + Sync>>>>;

/// Turns queries and records into dialect SQL.
///
/// Cheap to clone: the dialect and catalog are shared, and so are the
/// subquery routes.
#[derive(Debug, Clone)]
pub struct SqlGenerator {
    dialect: Arc<dyn SqlDialect>,
    catalog: Arc<Catalog>,
    routes: Routes,
}

impl SqlGenerator {
    /// Create a generator for a dialect.
    pub fn new(dialect: Arc<dyn SqlDialect>, catalog: Arc<Catalog>) -> Self {
        Self {
            dialect,
            catalog,
            routes: Arc::default(),
        }
    }

    /// Generator for SQL Server.
    pub fn sql_server(catalog: Arc<Catalog>) -> Self {
        Self::new(Arc::new(SqlServerDialect), catalog)
    }

    /// Generator for PostgreSQL.
    pub fn postgres(catalog: Arc<Catalog>) -> Self {
        Self::new(Arc::new(PostgresDialect), catalog)
    }

    /// The dialect in use.
    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// The catalog entities are resolved against.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Ask `routes` for the SQL of every association hop in a dotted path,
    /// so each hop is rendered by the provider owning it.
    ///
    /// Until routes are set, or once they are dropped, this generator maps
    /// every hop itself.
    pub fn route_subqueries(&self, routes: Weak<dyn SubqueryMapper + Send + Sync>) {
        *self.routes.write() = Some(routes);
    }

    /// Generate the row query for `query`.
    pub fn generate_select(&self, query: &Query) -> Result<SqlCommand, Error> {
        query.validate()?;
        let entity = self.concrete(&query.entity)?;
        let alias = entity.alias.as_str();
        let mut parameters = Parameters::new();
        let where_clause = self.generate_where(&entity, alias, &query.criteria, &mut parameters)?;

        let mut sql = String::from("SELECT ");
        if let Some(top) = self.dialect.top_clause(query.take, query.paging.as_ref()) {
            sql.push_str(&top);
            sql.push(' ');
        }
        sql.push_str(&self.select_list(&entity, alias));
        sql.push_str(&format!(" FROM {} AS {alias}", self.safe_id(&entity.table)));
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        if !query.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.generate_order_by(&entity, alias, &query.order_by)?);
        }
        if let Some(limit) = self.dialect.limit_clause(query.take, query.paging.as_ref()) {
            sql.push(' ');
            sql.push_str(&limit);
        }

        debug!(dialect = self.dialect.name(), entity = %entity.name, sql = %sql, "generated select");
        Ok(SqlCommand { sql, parameters })
    }

    /// Generate the row-count query for `query`. Order and paging are ignored.
    pub fn generate_count(&self, query: &Query) -> Result<SqlCommand, Error> {
        let entity = self.concrete(&query.entity)?;
        let alias = entity.alias.as_str();
        let mut parameters = Parameters::new();
        let where_clause = self.generate_where(&entity, alias, &query.criteria, &mut parameters)?;

        let mut sql = format!(
            "SELECT COUNT(*) FROM {} AS {alias}",
            self.safe_id(&entity.table)
        );
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }

        debug!(dialect = self.dialect.name(), entity = %entity.name, sql = %sql, "generated count");
        Ok(SqlCommand { sql, parameters })
    }

    /// Generate the body of a WHERE clause (without the keyword).
    ///
    /// Top-level criteria are ANDed. Soft-deleting entities get an implicit
    /// filter on the deletion flag unless the caller already filters on it.
    /// Returns an empty string when nothing needs filtering.
    pub fn generate_where(
        &self,
        entity: &Arc<EntityDef>,
        alias: &str,
        criteria: &[Criterion],
        parameters: &mut Parameters,
    ) -> Result<String, Error> {
        // Raw SQL names its parameters itself, so generated names give way.
        for name in criteria.iter().flat_map(Criterion::raw_parameter_names) {
            parameters.reserve(name);
        }
        let mut parts = Vec::with_capacity(criteria.len() + 1);
        for criterion in criteria {
            parts.push(self.generate_criterion(entity, alias, criterion, parameters)?);
        }
        if entity.has_soft_delete() && !criteria.iter().any(|c| c.mentions_property(SOFT_DELETE_FIELD))
        {
            let hidden = Criterion::eq(SOFT_DELETE_FIELD, false);
            parts.push(self.generate_criterion(entity, alias, &hidden, parameters)?);
        }
        Ok(parts.join(" AND "))
    }

    /// Generate one criterion.
    pub fn generate_criterion(
        &self,
        entity: &Arc<EntityDef>,
        alias: &str,
        criterion: &Criterion,
        parameters: &mut Parameters,
    ) -> Result<String, Error> {
        match criterion {
            Criterion::Empty => Ok("(1 = 1)".to_string()),
            Criterion::Simple(simple) => self.generate_simple(entity, alias, simple, parameters),
            Criterion::Composite(composite) => {
                let left = self.generate_criterion(entity, alias, &composite.left, parameters)?;
                let right = self.generate_criterion(entity, alias, &composite.right, parameters)?;
                Ok(format!("({left} {} {right})", composite.operator.as_str()))
            }
            Criterion::Raw(raw) => self.generate_raw(entity, alias, raw, parameters),
        }
    }

    /// Generate an ORDER BY list (without the keyword).
    pub fn generate_order_by(
        &self,
        entity: &EntityDef,
        alias: &str,
        order: &[OrderSpec],
    ) -> Result<String, Error> {
        let mut parts = Vec::with_capacity(order.len());
        for spec in order {
            if spec.property.contains('.') {
                return Err(Error::Usage(format!(
                    "cannot sort `{}` by association path `{}`",
                    entity.name, spec.property
                )));
            }
            let column = self.column_ref(entity, alias, &spec.property)?;
            parts.push(match spec.direction {
                OrderDirection::Asc => column,
                OrderDirection::Desc => format!("{column} DESC"),
            });
        }
        Ok(parts.join(", "))
    }

    /// Generate an INSERT for a record.
    ///
    /// A null identifier is left to the database to generate.
    pub fn generate_insert(
        &self,
        entity: &EntityDef,
        record: &EntityRecord,
    ) -> Result<SqlCommand, Error> {
        let mut parameters = Parameters::new();
        let mut columns = Vec::new();
        let mut values = Vec::new();

        if !record.id.is_null() {
            columns.push(self.safe_id(entity.identity_column()));
            values.push(self.parameter(&mut parameters, &entity.identity_field, record.id.clone()));
        }
        for field in self.writable_fields(entity) {
            if let (Some(column), Some(value)) = (field.column_name(), record.get(&field.name)) {
                columns.push(self.safe_id(column));
                values.push(self.parameter(&mut parameters, &field.name, value.clone()));
            }
        }
        if columns.is_empty() {
            return Err(Error::Usage(format!(
                "nothing to insert for `{}`",
                entity.name
            )));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.safe_id(&entity.table),
            columns.join(", "),
            values.join(", ")
        );
        debug!(dialect = self.dialect.name(), entity = %entity.name, sql = %sql, "generated insert");
        Ok(SqlCommand { sql, parameters })
    }

    /// Generate an UPDATE for a record, keyed by its identifier.
    ///
    /// Under a dialect that supports it, the statement only matches when the
    /// row version is unchanged, so a concurrent write yields zero rows.
    pub fn generate_update(
        &self,
        entity: &EntityDef,
        record: &EntityRecord,
    ) -> Result<SqlCommand, Error> {
        let mut parameters = Parameters::new();
        let mut assignments = Vec::new();
        for field in self.writable_fields(entity) {
            if let (Some(column), Some(value)) = (field.column_name(), record.get(&field.name)) {
                let name = self.parameter(&mut parameters, &field.name, value.clone());
                assignments.push(format!("{} = {name}", self.safe_id(column)));
            }
        }
        if assignments.is_empty() {
            return Err(Error::Usage(format!(
                "nothing to update for `{}`",
                entity.name
            )));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.safe_id(&entity.table),
            assignments.join(", "),
            self.key_condition(entity, record, &mut parameters)?
        );
        debug!(dialect = self.dialect.name(), entity = %entity.name, sql = %sql, "generated update");
        Ok(SqlCommand { sql, parameters })
    }

    /// Generate a DELETE for a record.
    ///
    /// Soft-deleting entities are flagged instead of removed.
    pub fn generate_delete(
        &self,
        entity: &EntityDef,
        record: &EntityRecord,
    ) -> Result<SqlCommand, Error> {
        let mut parameters = Parameters::new();
        let sql = if entity.has_soft_delete() {
            let column = entity.column_for(SOFT_DELETE_FIELD).unwrap_or(SOFT_DELETE_FIELD);
            let flag = self.parameter(&mut parameters, SOFT_DELETE_FIELD, Value::Bool(true));
            format!(
                "UPDATE {} SET {} = {flag} WHERE {}",
                self.safe_id(&entity.table),
                self.safe_id(column),
                self.key_condition(entity, record, &mut parameters)?
            )
        } else {
            format!(
                "DELETE FROM {} WHERE {}",
                self.safe_id(&entity.table),
                self.key_condition(entity, record, &mut parameters)?
            )
        };
        debug!(dialect = self.dialect.name(), entity = %entity.name, sql = %sql, "generated delete");
        Ok(SqlCommand { sql, parameters })
    }

    /// Subquery fragment for the association `segment` of `entity`.
    pub fn map_segment(
        &self,
        entity: &str,
        owner_alias: &str,
        segment: &str,
        alias: &str,
    ) -> Result<String, Error> {
        let owner = self.catalog.get(entity)?;
        let (field, target) = self.catalog.association(&owner, segment)?;
        self.map_subquery(&owner, owner_alias, &field, &target, alias)
    }

    /// Qualified, quoted column reference for a property.
    pub fn column_ref(&self, entity: &EntityDef, alias: &str, property: &str) -> Result<String, Error> {
        let column = entity
            .column_for(property)
            .ok_or_else(|| Error::unknown_property(&entity.name, property))?;
        Ok(format!("{alias}.{}", self.safe_id(column)))
    }

    /// Quote an identifier for the dialect.
    pub fn safe_id(&self, id: &str) -> String {
        self.dialect.safe_id(id)
    }

    /// Remove dialect quoting from an identifier.
    pub fn unescape_id(&self, id: &str) -> String {
        self.dialect.unescape_id(id)
    }

    fn concrete(&self, name: &str) -> Result<Arc<EntityDef>, Error> {
        let entity = self.catalog.get(name)?;
        if entity.is_abstract() {
            return Err(Error::Usage(format!(
                "`{name}` is abstract and has no table of its own"
            )));
        }
        Ok(entity)
    }

    fn select_list(&self, entity: &EntityDef, alias: &str) -> String {
        std::iter::once(entity.identity_column())
            .chain(entity.stored_fields().filter_map(FieldDef::column_name))
            .map(|column| format!("{alias}.{}", self.safe_id(column)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn writable_fields<'e>(&self, entity: &'e EntityDef) -> impl Iterator<Item = &'e FieldDef> {
        let row_version = entity.row_version_field.clone();
        entity
            .stored_fields()
            .filter(move |f| !f.is_computed() && Some(&f.name) != row_version.as_ref())
    }

    fn key_condition(
        &self,
        entity: &EntityDef,
        record: &EntityRecord,
        parameters: &mut Parameters,
    ) -> Result<String, Error> {
        if record.id.is_null() {
            return Err(Error::Usage(format!(
                "`{}` record has no identifier",
                entity.name
            )));
        }
        let id = self.parameter(parameters, &entity.identity_field, record.id.clone());
        let mut condition = format!("{} = {id}", self.safe_id(entity.identity_column()));

        if self.dialect.supports_row_version() {
            if let Some(field) = &entity.row_version_field {
                if let Some(version) = record.get(field).filter(|v| !v.is_null()) {
                    let column = entity.column_for(field).unwrap_or(field);
                    let name = self.parameter(parameters, field, version.clone());
                    condition.push_str(&format!(" AND {} = {name}", self.safe_id(column)));
                }
            }
        }
        Ok(condition)
    }

    fn parameter(&self, parameters: &mut Parameters, base: &str, value: Value) -> String {
        let name = parameters.add(self.dialect.as_ref(), base, value);
        format!("{}{name}", self.dialect.parameter_prefix())
    }

    fn typed_parameter(
        &self,
        mapper: &dyn SubqueryMapper,
        entity: &EntityDef,
        parameters: &mut Parameters,
        base: &str,
        value: Value,
    ) -> Result<String, Error> {
        let name = parameters.add_with(base, |name| mapper.generate_parameter(entity, name, value))?;
        Ok(format!("{}{name}", self.dialect.parameter_prefix()))
    }

    fn generate_simple(
        &self,
        entity: &Arc<EntityDef>,
        alias: &str,
        criterion: &SimpleCriterion,
        parameters: &mut Parameters,
    ) -> Result<String, Error> {
        if !criterion.is_nested() {
            return self.generate_condition(self, entity, alias, criterion, parameters);
        }
        let routes = self.routes.read().as_ref().and_then(Weak::upgrade);
        let mapper: &dyn SubqueryMapper = match &routes {
            Some(routes) => routes.as_ref(),
            None => self,
        };

        let resolver = NestedPathResolver::new(&self.catalog, mapper);
        let mut resolved = resolver.resolve(entity.clone(), alias, &criterion.property)?;

        // Hops through soft-deleting types skip deleted rows, unless the leaf
        // filters on the flag itself.
        let last = resolved.hops.len().saturating_sub(1);
        for (index, (target, hop_alias)) in resolved.hops.iter().enumerate() {
            let explicit = index == last && resolved.property == SOFT_DELETE_FIELD;
            if !target.has_soft_delete() || explicit {
                continue;
            }
            let hidden = SimpleCriterion::new(SOFT_DELETE_FIELD, FilterFunction::Is, false);
            let condition = self.generate_condition(mapper, target, hop_alias, &hidden, parameters)?;
            resolved.subqueries[index].push_str(" AND ");
            resolved.subqueries[index].push_str(&condition);
        }

        let leaf = SimpleCriterion {
            property: resolved.property.clone(),
            ..criterion.clone()
        };
        let condition =
            self.generate_condition(mapper, &resolved.entity, &resolved.alias, &leaf, parameters)?;
        Ok(resolved.wrap(&condition))
    }

    /// One predicate on a direct property of `entity`. Parameters are typed
    /// by `mapper` on behalf of `entity`.
    fn generate_condition(
        &self,
        mapper: &dyn SubqueryMapper,
        entity: &EntityDef,
        alias: &str,
        criterion: &SimpleCriterion,
        parameters: &mut Parameters,
    ) -> Result<String, Error> {
        let column = self.column_ref(entity, alias, &criterion.property)?;
        let property = criterion.property.as_str();

        if criterion.value.is_null() {
            return Ok(match criterion.function {
                FilterFunction::Is => format!("{column} IS NULL"),
                _ => format!("{column} IS NOT NULL"),
            });
        }

        let sql = match criterion.function {
            FilterFunction::In | FilterFunction::NotIn => {
                let values = match &criterion.value {
                    Value::List(values) => values.clone(),
                    single => vec![single.clone()],
                };
                let negated = criterion.function == FilterFunction::NotIn;
                if values.is_empty() {
                    return Ok(if negated { "(1 = 1)" } else { "(1 = 0)" }.to_string());
                }
                let names = values
                    .into_iter()
                    .map(|value| self.typed_parameter(mapper, entity, parameters, property, value))
                    .collect::<Result<Vec<_>, Error>>()?
                    .join(", ");
                if negated {
                    format!("({column} NOT IN ({names}) OR {column} IS NULL)")
                } else {
                    format!("{column} IN ({names})")
                }
            }
            FilterFunction::Contains
            | FilterFunction::NotContains
            | FilterFunction::BeginsWith
            | FilterFunction::EndsWith => {
                let text = match &criterion.value {
                    Value::String(text) => text.clone(),
                    other => other.to_key_string(),
                };
                let escaped = self.dialect.escape_like(&text);
                let pattern = match criterion.function {
                    FilterFunction::BeginsWith => format!("{escaped}%"),
                    FilterFunction::EndsWith => format!("%{escaped}"),
                    _ => format!("%{escaped}%"),
                };
                let name = self.typed_parameter(
                    mapper,
                    entity,
                    parameters,
                    property,
                    Value::String(pattern),
                )?;
                let operator = self.dialect.like_operator();
                if criterion.function == FilterFunction::NotContains {
                    format!("{column} NOT {operator} {name}")
                } else {
                    format!("{column} {operator} {name}")
                }
            }
            FilterFunction::IsNot => {
                let name = self.typed_parameter(
                    mapper,
                    entity,
                    parameters,
                    property,
                    criterion.value.clone(),
                )?;
                format!("({column} <> {name} OR {column} IS NULL)")
            }
            function => {
                let operator = match function {
                    FilterFunction::LessThan => "<",
                    FilterFunction::LessThanOrEqual => "<=",
                    FilterFunction::MoreThan => ">",
                    FilterFunction::MoreThanOrEqual => ">=",
                    _ => "=",
                };
                let name = self.typed_parameter(
                    mapper,
                    entity,
                    parameters,
                    property,
                    criterion.value.clone(),
                )?;
                format!("{column} {operator} {name}")
            }
        };
        Ok(sql)
    }

    fn generate_raw(
        &self,
        entity: &EntityDef,
        alias: &str,
        raw: &RawCriterion,
        parameters: &mut Parameters,
    ) -> Result<String, Error> {
        let sql = raw.substitute(|property| self.column_ref(entity, alias, property))?;
        for (name, value) in &raw.parameters {
            parameters.bind(self.dialect.as_ref(), name, value.clone())?;
        }
        Ok(format!("({sql})"))
    }
}

impl SubqueryMapper for SqlGenerator {
    fn map_subquery(
        &self,
        owner: &EntityDef,
        owner_alias: &str,
        association: &FieldDef,
        target: &EntityDef,
        alias: &str,
    ) -> Result<String, Error> {
        let from = format!(
            "EXISTS (SELECT 1 FROM {} AS {alias} WHERE",
            self.safe_id(&target.table)
        );
        let target_id = format!("{alias}.{}", self.safe_id(target.identity_column()));
        let owner_id = format!("{owner_alias}.{}", self.safe_id(owner.identity_column()));

        match &association.field_type {
            FieldType::Reference { .. } => {
                let column = association
                    .column_name()
                    .ok_or_else(|| Error::unknown_property(&owner.name, &association.name))?;
                Ok(format!(
                    "{from} {target_id} = {owner_alias}.{}",
                    self.safe_id(column)
                ))
            }
            FieldType::Children { foreign_key, .. } => {
                let fk = self.column_ref(target, alias, foreign_key)?;
                Ok(format!("{from} {fk} = {owner_id}"))
            }
            FieldType::ManyReference {
                bridge_table,
                owner_column,
                target_column,
                ..
            } => Ok(format!(
                "{from} {target_id} IN (SELECT {} FROM {} WHERE {} = {owner_id})",
                self.safe_id(target_column),
                self.safe_id(bridge_table),
                self.safe_id(owner_column)
            )),
            FieldType::Scalar(_) | FieldType::OptionalScalar(_) => Err(Error::Usage(format!(
                "`{}.{}` is not an association",
                owner.name, association.name
            ))),
        }
    }

    fn generate_parameter(
        &self,
        _owner: &EntityDef,
        name: &str,
        value: Value,
    ) -> Result<SqlParameter, Error> {
        Ok(SqlParameter {
            name: name.to_string(),
            sql_type: self.dialect.parameter_type(&value),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ScalarType, FieldType};
    use ormsql_proto::Query;
    use pretty_assertions::assert_eq;

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::with_entities([
                EntityDef::new("Person", "ID")
                    .with_alias("P")
                    .with_field(FieldDef::new("ID", FieldType::scalar(ScalarType::Int64)))
                    .with_field(FieldDef::new("FirstName", FieldType::scalar(ScalarType::String)))
                    .with_field(FieldDef::optional_scalar("Age", ScalarType::Int32)),
                EntityDef::new("Order", "ID")
                    .with_table("Orders")
                    .with_alias("O")
                    .with_field(FieldDef::new("ID", FieldType::scalar(ScalarType::Int64)))
                    .with_field(FieldDef::reference("Customer", "Customer"))
                    .with_field(FieldDef::new("Total", FieldType::scalar(ScalarType::Int64)))
                    .with_field(FieldDef::new("Lines", FieldType::children("OrderLine", "Order")))
                    .with_field(FieldDef::new(
                        "Tags",
                        FieldType::many_reference("Tag", "OrderTags", "OrderId", "TagId"),
                    ))
                    .with_field(FieldDef::new("RowVersion", FieldType::scalar(ScalarType::Bytes)))
                    .with_row_version("RowVersion"),
                EntityDef::new("Customer", "ID")
                    .with_table("Customers")
                    .with_alias("C")
                    .with_field(FieldDef::new("Name", FieldType::scalar(ScalarType::String)))
                    .with_field(FieldDef::reference("Address", "Address"))
                    .with_soft_delete(),
                EntityDef::new("Address", "ID")
                    .with_table("Addresses")
                    .with_field(FieldDef::new("Country", FieldType::scalar(ScalarType::String))),
                EntityDef::new("OrderLine", "ID")
                    .with_field(FieldDef::reference("Order", "Order"))
                    .with_field(FieldDef::new("Sku", FieldType::scalar(ScalarType::String))),
                EntityDef::new("Tag", "ID")
                    .with_field(FieldDef::new("Label", FieldType::scalar(ScalarType::String))),
                EntityDef::new("Contact", "ID").with_implementations(["Person"]),
            ])
            .unwrap(),
        )
    }

    fn where_of(sql: &str) -> &str {
        sql.split_once(" WHERE ").map(|(_, w)| w).unwrap_or("")
    }

    #[test]
    fn test_simple_equality_sql_server() {
        let generator = SqlGenerator::sql_server(catalog());
        let query = Query::new("Person").with_criterion(Criterion::eq("FirstName", "Jo"));
        let command = generator.generate_select(&query).unwrap();

        assert_eq!(
            command.sql,
            "SELECT P.[ID], P.[FirstName], P.[Age] FROM [Person] AS P WHERE P.[FirstName] = @FirstName"
        );
        assert_eq!(command.parameters.len(), 1);
        let param = command.parameters.get("FirstName").unwrap();
        assert_eq!(param.value, Value::from("Jo"));
        assert_eq!(param.sql_type, "nvarchar");
    }

    #[test]
    fn test_simple_equality_postgres() {
        let generator = SqlGenerator::postgres(catalog());
        let query = Query::new("Person").with_criterion(Criterion::eq("FirstName", "Jo"));
        let command = generator.generate_select(&query).unwrap();

        assert_eq!(where_of(&command.sql), "P.\"FirstName\" = @FirstName");
        assert_eq!(command.parameters.get("FirstName").unwrap().sql_type, "text");
    }

    #[test]
    fn test_null_handling() {
        let generator = SqlGenerator::sql_server(catalog());
        let query = Query::new("Person")
            .with_criterion(Criterion::is_null("Age"))
            .with_criterion(Criterion::new("FirstName", FilterFunction::MoreThan, Value::Null));
        let command = generator.generate_select(&query).unwrap();

        assert_eq!(
            where_of(&command.sql),
            "P.[Age] IS NULL AND P.[FirstName] IS NOT NULL"
        );
        assert!(command.parameters.is_empty());
    }

    #[test]
    fn test_is_not_matches_nulls() {
        let generator = SqlGenerator::sql_server(catalog());
        let query = Query::new("Person").with_criterion(Criterion::ne("Age", 30i32));
        let command = generator.generate_select(&query).unwrap();

        assert_eq!(where_of(&command.sql), "(P.[Age] <> @Age OR P.[Age] IS NULL)");
    }

    #[test]
    fn test_in_lists() {
        let generator = SqlGenerator::sql_server(catalog());
        let query = Query::new("Person").with_criterion(Criterion::in_values(
            "Age",
            vec![1i32.into(), 2i32.into(), 3i32.into()],
        ));
        let command = generator.generate_select(&query).unwrap();
        assert_eq!(where_of(&command.sql), "P.[Age] IN (@Age, @Age_2, @Age_3)");
        assert_eq!(command.parameters.len(), 3);

        let empty_in = Query::new("Person").with_criterion(Criterion::in_values("Age", vec![]));
        let command = generator.generate_select(&empty_in).unwrap();
        assert_eq!(where_of(&command.sql), "(1 = 0)");
        assert!(command.parameters.is_empty());

        let empty_not_in =
            Query::new("Person").with_criterion(Criterion::not_in_values("Age", vec![]));
        let command = generator.generate_select(&empty_not_in).unwrap();
        assert_eq!(where_of(&command.sql), "(1 = 1)");
    }

    #[test]
    fn test_like_patterns_are_escaped() {
        let generator = SqlGenerator::sql_server(catalog());
        let query = Query::new("Person")
            .with_criterion(Criterion::contains("FirstName", "50%"))
            .with_criterion(Criterion::begins_with("FirstName", "Jo"))
            .with_criterion(Criterion::not_contains("FirstName", "x_y"));
        let command = generator.generate_select(&query).unwrap();

        assert_eq!(
            where_of(&command.sql),
            "P.[FirstName] LIKE @FirstName AND P.[FirstName] LIKE @FirstName_2 \
             AND P.[FirstName] NOT LIKE @FirstName_3"
        );
        let values: Vec<_> = command.parameters.iter().map(|p| p.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                Value::from("%50[%]%"),
                Value::from("Jo%"),
                Value::from("%x[_]y%")
            ]
        );
    }

    #[test]
    fn test_postgres_uses_ilike() {
        let generator = SqlGenerator::postgres(catalog());
        let query = Query::new("Person").with_criterion(Criterion::ends_with("FirstName", "_a"));
        let command = generator.generate_select(&query).unwrap();

        assert_eq!(where_of(&command.sql), "P.\"FirstName\" ILIKE @FirstName");
        assert_eq!(
            command.parameters.get("FirstName").unwrap().value,
            Value::from("%\\_a")
        );
    }

    #[test]
    fn test_composite_criteria() {
        let generator = SqlGenerator::sql_server(catalog());
        let query = Query::new("Person").with_criterion(Criterion::or(
            Criterion::eq("FirstName", "Jo"),
            Criterion::and(Criterion::gt("Age", 18i32), Criterion::le("Age", 65i32)),
        ));
        let command = generator.generate_select(&query).unwrap();

        assert_eq!(
            where_of(&command.sql),
            "(P.[FirstName] = @FirstName OR (P.[Age] > @Age AND P.[Age] <= @Age_2))"
        );
    }

    #[test]
    fn test_nested_reference_path() {
        let generator = SqlGenerator::sql_server(catalog());
        let query = Query::new("Order").with_criterion(Criterion::eq("Customer.Address.Country", "UK"));
        let command = generator.generate_select(&query).unwrap();

        assert_eq!(
            where_of(&command.sql),
            "EXISTS (SELECT 1 FROM [Customers] AS O_Customer WHERE O_Customer.[ID] = O.[Customer] \
             AND O_Customer.[IsMarkedSoftDeleted] = @IsMarkedSoftDeleted \
             AND EXISTS (SELECT 1 FROM [Addresses] AS O_Customer_Address \
             WHERE O_Customer_Address.[ID] = O_Customer.[Address] \
             AND O_Customer_Address.[Country] = @Country))"
        );
        assert_eq!(
            command.parameters.get("IsMarkedSoftDeleted").unwrap().value,
            Value::Bool(false)
        );
    }

    #[test]
    fn test_nested_hop_filter_yields_to_explicit_flag() {
        let generator = SqlGenerator::sql_server(catalog());
        let query = Query::new("Order")
            .with_criterion(Criterion::eq("Customer.IsMarkedSoftDeleted", true));
        let command = generator.generate_select(&query).unwrap();

        assert_eq!(
            where_of(&command.sql),
            "EXISTS (SELECT 1 FROM [Customers] AS O_Customer WHERE O_Customer.[ID] = O.[Customer] \
             AND O_Customer.[IsMarkedSoftDeleted] = @IsMarkedSoftDeleted)"
        );
        assert_eq!(command.parameters.len(), 1);
        assert_eq!(
            command.parameters.get("IsMarkedSoftDeleted").unwrap().value,
            Value::Bool(true)
        );
    }

    #[test]
    fn test_nested_children_and_many_reference() {
        let generator = SqlGenerator::sql_server(catalog());
        let query = Query::new("Order")
            .with_criterion(Criterion::eq("Lines.Sku", "A1"))
            .with_criterion(Criterion::eq("Tags.Label", "gift"));
        let command = generator.generate_select(&query).unwrap();

        assert_eq!(
            where_of(&command.sql),
            "EXISTS (SELECT 1 FROM [OrderLine] AS O_Lines WHERE O_Lines.[Order] = O.[ID] \
             AND O_Lines.[Sku] = @Sku) AND \
             EXISTS (SELECT 1 FROM [Tag] AS O_Tags WHERE O_Tags.[ID] IN \
             (SELECT [TagId] FROM [OrderTags] WHERE [OrderId] = O.[ID]) \
             AND O_Tags.[Label] = @Label)"
        );
    }

    #[test]
    fn test_foreign_key_sugar() {
        let generator = SqlGenerator::sql_server(catalog());
        let query = Query::new("Order").with_criterion(Criterion::eq("CustomerId", 7i64));
        let command = generator.generate_select(&query).unwrap();

        assert_eq!(where_of(&command.sql), "O.[Customer] = @CustomerId");
    }

    #[test]
    fn test_soft_delete_filter() {
        let generator = SqlGenerator::sql_server(catalog());
        let command = generator
            .generate_select(&Query::new("Customer").with_criterion(Criterion::eq("Name", "A")))
            .unwrap();
        assert_eq!(
            where_of(&command.sql),
            "C.[Name] = @Name AND C.[IsMarkedSoftDeleted] = @IsMarkedSoftDeleted"
        );
        assert_eq!(
            command.parameters.get("IsMarkedSoftDeleted").unwrap().value,
            Value::Bool(false)
        );

        let explicit = Query::new("Customer").with_criterion(Criterion::eq(SOFT_DELETE_FIELD, true));
        let command = generator.generate_select(&explicit).unwrap();
        assert_eq!(command.parameters.len(), 1);
        assert_eq!(
            command.parameters.get("IsMarkedSoftDeleted").unwrap().value,
            Value::Bool(true)
        );
    }

    #[test]
    fn test_raw_criterion() {
        let generator = SqlGenerator::sql_server(catalog());
        let raw = RawCriterion::new("${{Age}} > @MinAge AND ${{ FirstName }} <> ''")
            .with_parameter("MinAge", 21i32);
        let query = Query::new("Person").with_criterion(Criterion::raw(raw));
        let command = generator.generate_select(&query).unwrap();

        assert_eq!(
            where_of(&command.sql),
            "(P.[Age] > @MinAge AND P.[FirstName] <> '')"
        );
        assert_eq!(command.parameters.get("MinAge").unwrap().value, Value::Int32(21));
    }

    #[test]
    fn test_raw_parameter_names_win_over_generated_ones() {
        let generator = SqlGenerator::sql_server(catalog());
        let query = Query::new("Person")
            .with_criterion(Criterion::gt("Age", 5i32))
            .with_criterion(Criterion::raw(
                RawCriterion::new("${{Age}} < @Age").with_parameter("Age", 10i32),
            ));
        let command = generator.generate_select(&query).unwrap();

        assert_eq!(where_of(&command.sql), "P.[Age] > @Age_2 AND (P.[Age] < @Age)");
        assert_eq!(command.parameters.get("Age").unwrap().value, Value::Int32(10));
        assert_eq!(command.parameters.get("Age_2").unwrap().value, Value::Int32(5));
    }

    #[test]
    fn test_unknown_property() {
        let generator = SqlGenerator::sql_server(catalog());
        let query = Query::new("Person").with_criterion(Criterion::eq("Nickname", "J"));
        assert!(matches!(
            generator.generate_select(&query),
            Err(Error::UnknownProperty { entity, property })
                if entity == "Person" && property == "Nickname"
        ));
    }

    #[test]
    fn test_top_and_paging() {
        let sql_server = SqlGenerator::sql_server(catalog());
        let postgres = SqlGenerator::postgres(catalog());
        let top = Query::new("Person")
            .with_order(OrderSpec::desc("Age"))
            .take(5);
        let paged = Query::new("Person")
            .with_order(OrderSpec::asc("FirstName"))
            .with_paging(20, 10);

        assert_eq!(
            sql_server.generate_select(&top).unwrap().sql,
            "SELECT TOP 5 P.[ID], P.[FirstName], P.[Age] FROM [Person] AS P ORDER BY P.[Age] DESC"
        );
        assert_eq!(
            sql_server.generate_select(&paged).unwrap().sql,
            "SELECT P.[ID], P.[FirstName], P.[Age] FROM [Person] AS P ORDER BY P.[FirstName] \
             OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert!(postgres
            .generate_select(&paged)
            .unwrap()
            .sql
            .ends_with("ORDER BY P.\"FirstName\" LIMIT 10 OFFSET 20"));
    }

    #[test]
    fn test_paging_without_order_is_rejected() {
        let generator = SqlGenerator::sql_server(catalog());
        let query = Query::new("Person").with_paging(0, 10);
        assert!(matches!(
            generator.generate_select(&query),
            Err(Error::Query(ormsql_proto::Error::PagingWithoutOrder { .. }))
        ));
    }

    #[test]
    fn test_abstract_type_has_no_sql() {
        let generator = SqlGenerator::sql_server(catalog());
        assert!(matches!(
            generator.generate_select(&Query::new("Contact")),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn test_count() {
        let generator = SqlGenerator::postgres(catalog());
        let query = Query::new("Person")
            .with_criterion(Criterion::ge("Age", 18i32))
            .with_order(OrderSpec::asc("Age"))
            .with_paging(0, 10);
        let command = generator.generate_count(&query).unwrap();
        assert_eq!(
            command.sql,
            "SELECT COUNT(*) FROM \"Person\" AS P WHERE P.\"Age\" >= @Age"
        );
    }

    #[test]
    fn test_insert() {
        let generator = SqlGenerator::sql_server(catalog());
        let catalog = generator.catalog().clone();
        let person = catalog.get("Person").unwrap();
        let record = EntityRecord::new("Person", 1i64)
            .with_field("FirstName", "Jo")
            .with_field("Age", 30i32);
        let command = generator.generate_insert(&person, &record).unwrap();

        assert_eq!(
            command.sql,
            "INSERT INTO [Person] ([ID], [FirstName], [Age]) VALUES (@ID, @FirstName, @Age)"
        );

        let generated_id = EntityRecord::new("Person", Value::Null).with_field("FirstName", "Al");
        let command = generator.generate_insert(&person, &generated_id).unwrap();
        assert_eq!(command.sql, "INSERT INTO [Person] ([FirstName]) VALUES (@FirstName)");
    }

    #[test]
    fn test_update_with_row_version() {
        let catalog = catalog();
        let order = catalog.get("Order").unwrap();
        let record = EntityRecord::new("Order", 9i64)
            .with_field("Total", 100i64)
            .with_field("RowVersion", vec![0u8, 1]);

        let command = SqlGenerator::sql_server(catalog.clone())
            .generate_update(&order, &record)
            .unwrap();
        assert_eq!(
            command.sql,
            "UPDATE [Orders] SET [Total] = @Total WHERE [ID] = @ID AND [RowVersion] = @RowVersion"
        );

        let command = SqlGenerator::postgres(catalog)
            .generate_update(&order, &record)
            .unwrap();
        assert_eq!(
            command.sql,
            "UPDATE \"Orders\" SET \"Total\" = @Total WHERE \"ID\" = @ID"
        );
    }

    #[test]
    fn test_delete_and_soft_delete() {
        let catalog = catalog();
        let generator = SqlGenerator::sql_server(catalog.clone());

        let person = catalog.get("Person").unwrap();
        let command = generator
            .generate_delete(&person, &EntityRecord::new("Person", 1i64))
            .unwrap();
        assert_eq!(command.sql, "DELETE FROM [Person] WHERE [ID] = @ID");

        let customer = catalog.get("Customer").unwrap();
        let command = generator
            .generate_delete(&customer, &EntityRecord::new("Customer", 2i64))
            .unwrap();
        assert_eq!(
            command.sql,
            "UPDATE [Customers] SET [IsMarkedSoftDeleted] = @IsMarkedSoftDeleted WHERE [ID] = @ID"
        );
        assert_eq!(
            command.parameters.get("IsMarkedSoftDeleted").unwrap().value,
            Value::Bool(true)
        );
    }

    #[test]
    fn test_map_segment() {
        let generator = SqlGenerator::postgres(catalog());
        let fragment = generator.map_segment("Order", "O", "Customer", "O_Customer").unwrap();
        assert_eq!(
            fragment,
            "EXISTS (SELECT 1 FROM \"Customers\" AS O_Customer WHERE O_Customer.\"ID\" = O.\"Customer\""
        );
    }
}
