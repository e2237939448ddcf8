//! Eager loading of association paths.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use ormsql_proto::{Criterion, EntityRecord, Include, Query, RawCriterion, Value};
use tracing::debug;

use super::executor::Database;
use crate::catalog::{EntityDef, FieldDef, FieldType};
use crate::context::Session;
use crate::error::Error;
use crate::provider::ProviderTarget;

const OWNER_PARAMETER: &str = "IncludeOwner";

impl Database {
    /// Load every include path for `records`, one batched query per
    /// association hop and owner type.
    ///
    /// Loaded rows land in the identity map; deeper hops recurse through
    /// [`get_list`](Database::get_list).
    pub(crate) fn load_includes<'a>(
        &'a self,
        session: &'a Session,
        records: &'a [Arc<EntityRecord>],
        includes: &'a [Include],
    ) -> BoxFuture<'a, Result<(), Error>> {
        async move {
            if includes.is_empty() || records.is_empty() {
                return Ok(());
            }

            let mut heads: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
            for include in includes {
                let tails = heads.entry(include.head()).or_default();
                if let Some(tail) = include.tail() {
                    tails.push(tail);
                }
            }

            let mut owners_by_type: BTreeMap<&str, Vec<&EntityRecord>> = BTreeMap::new();
            for record in records {
                owners_by_type
                    .entry(record.entity.as_str())
                    .or_default()
                    .push(record.as_ref());
            }

            for (type_name, owners) in &owners_by_type {
                let entity = self.catalog().get(type_name)?;
                for (head, tails) in &heads {
                    let (field, target) = self.catalog().association(&entity, head)?;
                    let Some(mut query) = self.association_query(&field, &target, owners)? else {
                        continue;
                    };
                    for tail in tails {
                        query = query.include(*tail);
                    }
                    let loaded = self.get_list(session, &query).await?;
                    debug!(owner = %type_name, association = %head, rows = loaded.len(), "included association");
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Query loading the targets of `field` for every owner in one go.
    ///
    /// `None` when no owner points anywhere.
    pub(crate) fn association_query(
        &self,
        field: &FieldDef,
        target: &EntityDef,
        owners: &[&EntityRecord],
    ) -> Result<Option<Query>, Error> {
        let criterion = match &field.field_type {
            FieldType::Reference { .. } => {
                let keys = distinct(owners.iter().filter_map(|owner| owner.get(&field.name)));
                if keys.is_empty() {
                    return Ok(None);
                }
                Criterion::in_values(target.identity_field.clone(), keys)
            }
            FieldType::Children { foreign_key, .. } => {
                let ids = distinct(owners.iter().map(|owner| &owner.id));
                if ids.is_empty() {
                    return Ok(None);
                }
                Criterion::in_values(foreign_key.clone(), ids)
            }
            FieldType::ManyReference {
                bridge_table,
                owner_column,
                target_column,
                ..
            } => {
                let ids = distinct(owners.iter().map(|owner| &owner.id));
                if ids.is_empty() {
                    return Ok(None);
                }
                self.bridge_criterion(target, bridge_table, owner_column, target_column, ids)?
            }
            FieldType::Scalar(_) | FieldType::OptionalScalar(_) => {
                return Err(Error::Usage(format!(
                    "`{}` is not an association",
                    field.name
                )));
            }
        };
        Ok(Some(Query::new(target.name.clone()).with_criterion(criterion)))
    }

    /// `target.ID IN (SELECT target_column FROM bridge WHERE owner_column IN (...))`
    /// in the dialect of the provider serving `target`.
    ///
    /// Bridge rows are not tracked by the cache, so the criterion is never
    /// cached.
    fn bridge_criterion(
        &self,
        target: &EntityDef,
        bridge_table: &str,
        owner_column: &str,
        target_column: &str,
        owner_ids: Vec<Value>,
    ) -> Result<Criterion, Error> {
        let provider = match self.providers().resolve(self.catalog(), target)? {
            ProviderTarget::Single(provider) => provider,
            ProviderTarget::FanOut(mut targets) => targets.swap_remove(0).1,
        };
        let dialect = provider.dialect();
        let prefix = dialect.parameter_prefix();

        let mut raw = RawCriterion::new(String::new());
        let mut references = Vec::with_capacity(owner_ids.len());
        for (index, id) in owner_ids.into_iter().enumerate() {
            let name = match index {
                0 => OWNER_PARAMETER.to_string(),
                n => format!("{OWNER_PARAMETER}_{}", n + 1),
            };
            references.push(format!("{prefix}{name}"));
            raw = raw.with_parameter(name, id);
        }
        raw.sql = format!(
            "${{{{{}}}}} IN (SELECT {} FROM {} WHERE {} IN ({}))",
            target.identity_field,
            dialect.safe_id(target_column),
            dialect.safe_id(bridge_table),
            dialect.safe_id(owner_column),
            references.join(", ")
        );
        Ok(Criterion::raw(raw.cache_unsafe()))
    }
}

fn distinct<'v>(values: impl Iterator<Item = &'v Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for value in values {
        if !value.is_null() && !out.contains(value) {
            out.push(value.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_drops_nulls_and_duplicates() {
        let values = [
            Value::Int64(1),
            Value::Null,
            Value::Int64(2),
            Value::Int64(1),
        ];
        assert_eq!(distinct(values.iter()), vec![Value::Int64(1), Value::Int64(2)]);
    }
}
