//! Shared fixtures: a small CRM catalog and an in-memory data provider.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use ormsql_core::catalog::{Catalog, EntityDef, FieldDef, FieldType, ScalarType};
use ormsql_core::context::DbContext;
use ormsql_core::provider::DataProvider;
use ormsql_core::sql::{SqlDialect, SqlParameter, SqlServerDialect};
use ormsql_core::Error;
use ormsql_proto::{
    BinaryOperator, Criterion, EntityRecord, FilterFunction, OrderDirection, Query, Value,
};
use parking_lot::Mutex;

pub fn crm_catalog() -> Arc<Catalog> {
    let person = EntityDef::new("Person", "ID")
        .in_namespace("Crm")
        .with_alias("P")
        .with_field(FieldDef::new("ID", FieldType::scalar(ScalarType::Int64)))
        .with_field(FieldDef::new("Name", FieldType::scalar(ScalarType::String)))
        .with_field(FieldDef::optional_scalar("Age", ScalarType::Int32))
        .with_field(FieldDef::optional_scalar("Ssn", ScalarType::String).encrypted())
        .with_field(FieldDef::new(
            "Orders",
            FieldType::children("Order", "CustomerId"),
        ));

    let company = EntityDef::new("Company", "ID")
        .in_namespace("Crm")
        .with_alias("C")
        .with_field(FieldDef::new("ID", FieldType::scalar(ScalarType::Int64)))
        .with_field(FieldDef::new("Name", FieldType::scalar(ScalarType::String)));

    let contact = EntityDef::new("Contact", "ID")
        .in_namespace("Crm")
        .with_implementations(["Person", "Company"])
        .with_field(FieldDef::new("ID", FieldType::scalar(ScalarType::Int64)))
        .with_field(FieldDef::new("Name", FieldType::scalar(ScalarType::String)));

    let order = EntityDef::new("Order", "ID")
        .in_namespace("Sales")
        .with_table("Orders")
        .with_alias("O")
        .with_field(FieldDef::new("ID", FieldType::scalar(ScalarType::Int64)))
        .with_field(FieldDef::new("Total", FieldType::scalar(ScalarType::Int64)))
        .with_field(FieldDef::reference("Customer", "Person"));

    Arc::new(Catalog::with_entities([person, company, contact, order]).unwrap())
}

pub fn person(id: i64, name: &str, age: i32) -> EntityRecord {
    EntityRecord::new("Person", id)
        .with_field("Name", name)
        .with_field("Age", age)
}

pub fn company(id: i64, name: &str) -> EntityRecord {
    EntityRecord::new("Company", id).with_field("Name", name)
}

pub fn order(id: i64, total: i64, customer: i64) -> EntityRecord {
    EntityRecord::new("Order", id)
        .with_field("Total", total)
        .with_field("Customer", customer)
}

/// Tables held in memory. Criteria on direct properties are evaluated;
/// raw SQL criteria match every row.
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, Vec<EntityRecord>>>,
    loads: AtomicUsize,
    fail_next_write: AtomicBool,
    dialect: SqlServerDialect,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tables: Mutex::new(BTreeMap::new()),
            loads: AtomicUsize::new(0),
            fail_next_write: AtomicBool::new(false),
            dialect: SqlServerDialect,
        })
    }

    pub fn seed(&self, rows: impl IntoIterator<Item = EntityRecord>) {
        let mut tables = self.tables.lock();
        for row in rows {
            tables.entry(row.entity.clone()).or_default().push(row);
        }
    }

    pub fn stored(&self, entity: &str, id: i64) -> Option<EntityRecord> {
        self.tables
            .lock()
            .get(entity)?
            .iter()
            .find(|r| r.id == Value::Int64(id))
            .cloned()
    }

    /// Overwrite a row behind the engine's back.
    pub fn overwrite(&self, row: EntityRecord) {
        let mut tables = self.tables.lock();
        let table = tables.entry(row.entity.clone()).or_default();
        table.retain(|r| r.id != row.id);
        table.push(row);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(AtomicOrdering::SeqCst)
    }

    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, AtomicOrdering::SeqCst);
    }

    fn matching(&self, query: &Query) -> Vec<EntityRecord> {
        let tables = self.tables.lock();
        let mut rows: Vec<EntityRecord> = tables
            .get(&query.entity)
            .map(|rows| {
                rows.iter()
                    .filter(|r| query.criteria.iter().all(|c| matches(r, c)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by(|a, b| {
            for spec in &query.order_by {
                let ordering = property(a, &spec.property)
                    .compare(&property(b, &spec.property))
                    .unwrap_or(Ordering::Equal);
                let ordering = match spec.direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        match (query.paging, query.take) {
            (Some(paging), _) => rows
                .into_iter()
                .skip(paging.start_index as usize)
                .take(paging.page_size as usize)
                .collect(),
            (None, Some(take)) => rows.into_iter().take(take as usize).collect(),
            (None, None) => rows,
        }
    }

    fn write(&self, record: &EntityRecord, apply: impl FnOnce(&mut Vec<EntityRecord>) -> u64) -> u64 {
        if self.fail_next_write.swap(false, AtomicOrdering::SeqCst) {
            return 0;
        }
        let mut tables = self.tables.lock();
        apply(tables.entry(record.entity.clone()).or_default())
    }
}

fn property(record: &EntityRecord, name: &str) -> Value {
    if name == "ID" {
        return record.id.clone();
    }
    if let Some(value) = record.get(name) {
        return value.clone();
    }
    name.strip_suffix("Id")
        .and_then(|base| record.get(base))
        .cloned()
        .unwrap_or(Value::Null)
}

fn matches(record: &EntityRecord, criterion: &Criterion) -> bool {
    match criterion {
        Criterion::Empty | Criterion::Raw(_) => true,
        Criterion::Composite(composite) => {
            let left = matches(record, &composite.left);
            let right = matches(record, &composite.right);
            match composite.operator {
                BinaryOperator::And => left && right,
                BinaryOperator::Or => left || right,
            }
        }
        Criterion::Simple(simple) => {
            let actual = property(record, &simple.property);
            let ordering = actual.compare(&simple.value);
            match simple.function {
                FilterFunction::Is => ordering == Some(Ordering::Equal),
                FilterFunction::IsNot => ordering != Some(Ordering::Equal),
                FilterFunction::MoreThan => ordering == Some(Ordering::Greater),
                FilterFunction::LessThan => ordering == Some(Ordering::Less),
                FilterFunction::In => simple
                    .value
                    .as_list()
                    .is_some_and(|values| values.iter().any(|v| actual.compare(v) == Some(Ordering::Equal))),
                other => panic!("memory store does not evaluate {other}"),
            }
        }
    }
}

#[async_trait]
impl DataProvider for MemoryStore {
    async fn get_list(&self, query: &Query, _: &DbContext) -> Result<Vec<EntityRecord>, Error> {
        self.loads.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(self.matching(query))
    }

    async fn count(&self, query: &Query, _: &DbContext) -> Result<u64, Error> {
        Ok(self.matching(query).len() as u64)
    }

    async fn insert(&self, record: &EntityRecord, _: &DbContext) -> Result<u64, Error> {
        Ok(self.write(record, |table| {
            table.push(record.clone());
            1
        }))
    }

    async fn update(&self, record: &EntityRecord, _: &DbContext) -> Result<u64, Error> {
        Ok(self.write(record, |table| {
            match table.iter_mut().find(|r| r.id == record.id) {
                Some(row) => {
                    *row = record.clone();
                    1
                }
                None => 0,
            }
        }))
    }

    async fn delete(&self, record: &EntityRecord, _: &DbContext) -> Result<u64, Error> {
        Ok(self.write(record, |table| {
            let before = table.len();
            table.retain(|r| r.id != record.id);
            (before - table.len()) as u64
        }))
    }

    fn map_subquery(&self, entity: &str, _: &str, segment: &str, _: &str) -> Result<String, Error> {
        Err(Error::Usage(format!("no subqueries for `{entity}.{segment}`")))
    }

    fn generate_parameter(&self, name: &str, value: Value) -> SqlParameter {
        SqlParameter {
            name: name.to_string(),
            sql_type: self.dialect.parameter_type(&value),
            value,
        }
    }

    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }
}
