//! Cache-aware query execution.

use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use futures::future::try_join_all;
use ormsql_proto::{Criterion, EntityRecord, OrderDirection, OrderSpec, Query, Value};
use tracing::{debug, instrument, warn};

use super::cache::{cache_key, is_cacheable, CacheStats};
use super::identity::IdentityMap;
use crate::cache::{CacheProvider, MemoryCacheProvider};
use crate::catalog::{Catalog, EntityDef, FieldType};
use crate::context::Session;
use crate::encryption::{EncryptionInterceptor, PropertyCipher};
use crate::error::Error;
use crate::provider::{DataProvider, ProviderRegistry, ProviderTarget};
use crate::sql::SubqueryMapper;

/// Callback fired when a row is registered in the identity map.
pub type LoadedHook = Arc<dyn Fn(&EntityRecord) + Send + Sync>;

/// The query engine.
///
/// Decides per call whether to answer from the list cache or the data
/// providers, keeps one canonical instance per row in the identity map, fans
/// queries on abstract types out to every implementation, and invalidates
/// cached lists on writes.
pub struct Database {
    catalog: Arc<Catalog>,
    providers: Arc<ProviderRegistry>,
    cache: Arc<dyn CacheProvider>,
    identity: IdentityMap,
    encryption: EncryptionInterceptor,
    stats: CacheStats,
    loaded_hooks: Vec<LoadedHook>,
}

/// Builder for [`Database`].
pub struct DatabaseBuilder {
    catalog: Arc<Catalog>,
    providers: ProviderRegistry,
    cache: Option<Arc<dyn CacheProvider>>,
    cipher: Option<Arc<dyn PropertyCipher>>,
    loaded_hooks: Vec<LoadedHook>,
}

impl DatabaseBuilder {
    /// Route an entity type to a provider.
    pub fn provider(mut self, entity: impl Into<String>, provider: Arc<dyn DataProvider>) -> Self {
        self.providers.register(entity, provider);
        self
    }

    /// Provider for every type without an explicit route.
    pub fn default_provider(mut self, provider: Arc<dyn DataProvider>) -> Self {
        self.providers.set_fallback(provider);
        self
    }

    /// Cache backend. Defaults to [`MemoryCacheProvider`].
    pub fn cache(mut self, cache: Arc<dyn CacheProvider>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Cipher for encrypted properties.
    pub fn cipher(mut self, cipher: Arc<dyn PropertyCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Register a callback fired for every newly registered row.
    pub fn on_loaded(mut self, hook: impl Fn(&EntityRecord) + Send + Sync + 'static) -> Self {
        self.loaded_hooks.push(Arc::new(hook));
        self
    }

    /// Build the engine.
    ///
    /// Fails when the catalog has dangling references, when a property
    /// marked encrypted is not a string, or when encrypted properties exist
    /// without a cipher.
    pub fn build(self) -> Result<Database, Error> {
        self.catalog.validate()?;

        let encryption = match self.cipher {
            Some(cipher) => EncryptionInterceptor::new(cipher),
            None => EncryptionInterceptor::disabled(),
        };
        for name in self.catalog.entity_names() {
            let entity = self.catalog.get(&name)?;
            let encrypted = encryption.encrypted_properties(&entity)?;
            if !encrypted.is_empty() && !encryption.is_enabled() {
                return Err(Error::Configuration(format!(
                    "`{name}` has encrypted properties but no encryption key is configured"
                )));
            }
        }

        let providers = Arc::new(self.providers);
        let routes: Weak<dyn SubqueryMapper + Send + Sync> = Arc::<ProviderRegistry>::downgrade(&providers);
        for provider in providers.all() {
            provider.route_subqueries(routes.clone());
        }

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCacheProvider::new()));
        debug!(backend = cache.backend_name(), "database engine ready");

        Ok(Database {
            catalog: self.catalog,
            providers,
            cache,
            identity: IdentityMap::new(),
            encryption,
            stats: CacheStats::default(),
            loaded_hooks: self.loaded_hooks,
        })
    }
}

impl Database {
    /// Start building an engine over `catalog`.
    pub fn builder(catalog: Arc<Catalog>) -> DatabaseBuilder {
        DatabaseBuilder {
            catalog,
            providers: ProviderRegistry::new(),
            cache: None,
            cipher: None,
            loaded_hooks: Vec::new(),
        }
    }

    /// The entity catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// The cache backend.
    pub fn cache(&self) -> &Arc<dyn CacheProvider> {
        &self.cache
    }

    /// The identity map.
    pub fn identity_map(&self) -> &IdentityMap {
        &self.identity
    }

    /// Cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub(crate) fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Whether the result list of `query` may be cached.
    pub fn is_cacheable(&self, query: &Query) -> Result<bool, Error> {
        let entity = self.catalog.get(&query.entity)?;
        Ok(is_cacheable(query, &entity))
    }

    /// List cache key of `query`.
    pub fn cache_key(&self, query: &Query) -> Result<String, Error> {
        let entity = self.catalog.get(&query.entity)?;
        Ok(cache_key(query, &entity))
    }

    /// Load every row matching `query`.
    #[instrument(skip_all, fields(entity = %query.entity))]
    pub async fn get_list(
        &self,
        session: &Session,
        query: &Query,
    ) -> Result<Vec<Arc<EntityRecord>>, Error> {
        query.validate()?;
        let entity = self.catalog.get(&query.entity)?;
        let type_name = entity.qualified_name();
        let list_key = is_cacheable(query, &entity).then(|| cache_key(query, &entity));

        if let Some(key) = &list_key {
            if let Some(rows) = self.cache.get_list(&type_name, key).await? {
                self.stats.record_hit();
                debug!(rows = rows.len(), "list cache hit");
                let records = self.reconcile_all(rows).await?;
                self.load_includes(session, &records, &query.includes).await?;
                return Ok(records);
            }
            self.stats.record_miss();
        }

        let rows = self.load_rows(session, &entity, query).await?;

        if let Some(key) = &list_key {
            if session.has_open_transaction() {
                debug!("transaction open, result list not cached");
            } else {
                self.cache.add_list(&type_name, key, &rows).await?;
            }
        }

        let records = self.reconcile_all(rows).await?;
        self.load_includes(session, &records, &query.includes).await?;
        Ok(records)
    }

    /// Count rows matching `query`. Never cached.
    #[instrument(skip_all, fields(entity = %query.entity))]
    pub async fn count(&self, session: &Session, query: &Query) -> Result<u64, Error> {
        let entity = self.catalog.get(&query.entity)?;
        let context = session.current();
        match self.providers.resolve(&self.catalog, &entity)? {
            ProviderTarget::Single(provider) => provider.count(query, &context).await,
            ProviderTarget::FanOut(targets) => {
                let context = &context;
                let counts = try_join_all(targets.iter().map(|(concrete, provider)| {
                    let query = query.for_entity(concrete.name.clone());
                    async move { provider.count(&query, context).await }
                }))
                .await?;
                Ok(counts.into_iter().sum())
            }
        }
    }

    /// First row matching `query`, bypassing the list cache.
    #[instrument(skip_all, fields(entity = %query.entity))]
    pub async fn first_or_default(
        &self,
        session: &Session,
        query: &Query,
    ) -> Result<Option<Arc<EntityRecord>>, Error> {
        query.validate()?;
        let entity = self.catalog.get(&query.entity)?;

        let mut first = query.clone();
        match first.paging.as_mut() {
            Some(paging) => paging.page_size = 1,
            None => first.take = Some(1),
        }

        let rows = self.load_rows(session, &entity, &first).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let record = self.reconcile(row).await?;
        self.load_includes(session, std::slice::from_ref(&record), &query.includes)
            .await?;
        Ok(Some(record))
    }

    /// Load one row by identifier.
    ///
    /// Answers from the identity map unless the row was written since it was
    /// registered, then from the entity cache, then from the provider.
    #[instrument(skip_all, fields(entity = %entity_name, id = %id))]
    pub async fn get(
        &self,
        session: &Session,
        entity_name: &str,
        id: &Value,
    ) -> Result<Option<Arc<EntityRecord>>, Error> {
        let entity = self.catalog.get(entity_name)?;
        let candidates = if entity.is_abstract() {
            self.catalog.concrete_types(entity_name)?
        } else {
            vec![entity.clone()]
        };

        for concrete in &candidates {
            if let Some(resident) = self.fresh_resident(concrete, id).await? {
                return Ok(Some(resident));
            }
        }

        if !entity.is_abstract() {
            if let Some(row) = self.cache.get(&entity.qualified_name(), id).await? {
                self.stats.record_hit();
                return self.reconcile(row).await.map(Some);
            }
            self.stats.record_miss();
        }

        let query = Query::new(entity_name)
            .with_criterion(Criterion::eq(entity.identity_field.clone(), id.clone()))
            .take(1);
        let rows = self.load_rows(session, &entity, &query).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        if !session.has_open_transaction() {
            let concrete = self.catalog.get(&row.entity)?;
            self.cache.add(&concrete.qualified_name(), &row).await?;
        }
        self.reconcile(row).await.map(Some)
    }

    /// Follow a many-to-one association of `record`.
    pub async fn association(
        &self,
        session: &Session,
        record: &EntityRecord,
        name: &str,
    ) -> Result<Option<Arc<EntityRecord>>, Error> {
        let entity = self.catalog.get(&record.entity)?;
        let (field, target) = self.catalog.association(&entity, name)?;
        if !matches!(field.field_type, FieldType::Reference { .. }) {
            return Err(Error::Usage(format!(
                "`{}.{name}` is a collection; use `collection` instead",
                entity.name
            )));
        }
        match record.get(&field.name) {
            None | Some(Value::Null) => Ok(None),
            Some(id) => self.get(session, &target.name, id).await,
        }
    }

    /// Load a one-to-many or many-to-many association of `record`.
    pub async fn collection(
        &self,
        session: &Session,
        record: &EntityRecord,
        name: &str,
    ) -> Result<Vec<Arc<EntityRecord>>, Error> {
        let entity = self.catalog.get(&record.entity)?;
        let (field, target) = self.catalog.association(&entity, name)?;
        if matches!(field.field_type, FieldType::Reference { .. }) {
            return Err(Error::Usage(format!(
                "`{}.{name}` is a reference; use `association` instead",
                entity.name
            )));
        }
        match self.association_query(&field, &target, &[record])? {
            Some(query) => self.get_list(session, &query).await,
            None => Ok(Vec::new()),
        }
    }

    /// Insert a new row.
    #[instrument(skip_all, fields(entity = %record.entity))]
    pub async fn insert(
        &self,
        session: &Session,
        record: EntityRecord,
    ) -> Result<Arc<EntityRecord>, Error> {
        let (entity, provider) = self.writable(&record.entity)?;
        let persisted = self.persisted_form(&entity, &record)?;

        let affected = provider.insert(&persisted, &session.current()).await?;
        if affected == 0 {
            return Err(Error::Provider(format!(
                "insert into `{}` affected no rows",
                entity.name
            )));
        }

        let version = self.after_write(&entity, &record.id).await?;
        if record.id.is_null() {
            return Ok(Arc::new(record));
        }
        Ok(self.identity.replace(record, version))
    }

    /// Update an existing row.
    ///
    /// Zero affected rows means the row changed or vanished underneath us:
    /// every cached copy is evicted and a concurrency error is returned.
    #[instrument(skip_all, fields(entity = %record.entity, id = %record.id))]
    pub async fn update(
        &self,
        session: &Session,
        record: EntityRecord,
    ) -> Result<Arc<EntityRecord>, Error> {
        let (entity, provider) = self.writable(&record.entity)?;
        let persisted = self.persisted_form(&entity, &record)?;

        let affected = provider.update(&persisted, &session.current()).await?;
        if affected == 0 {
            return Err(self.concurrency_failure(&entity, &record.id).await);
        }

        let version = self.after_write(&entity, &record.id).await?;
        Ok(self.identity.replace(record, version))
    }

    /// Delete a row (or flag it, for soft-deleting types).
    #[instrument(skip_all, fields(entity = %record.entity, id = %record.id))]
    pub async fn delete(&self, session: &Session, record: &EntityRecord) -> Result<(), Error> {
        let (entity, provider) = self.writable(&record.entity)?;
        let persisted = self.persisted_form(&entity, record)?;

        let affected = provider.delete(&persisted, &session.current()).await?;
        if affected == 0 {
            return Err(self.concurrency_failure(&entity, &record.id).await);
        }

        self.after_write(&entity, &record.id).await?;
        self.identity.evict(&entity.name, &record.id);
        Ok(())
    }

    /// Drop every cached list of a type and of the abstract types above it.
    pub async fn invalidate(&self, entity_name: &str) -> Result<u64, Error> {
        let entity = self.catalog.get(entity_name)?;
        self.invalidate_lists(&entity).await
    }

    /// Drop all cached data and every resident instance.
    pub async fn clear_cache(&self) -> Result<(), Error> {
        self.cache.clear_all().await?;
        self.identity.clear();
        Ok(())
    }

    /// Resolve a loaded row to its canonical instance.
    ///
    /// A resident instance written elsewhere since it was registered is
    /// dropped first, so the loaded row replaces it.
    pub(crate) async fn reconcile(&self, row: EntityRecord) -> Result<Arc<EntityRecord>, Error> {
        let entity = self.catalog.get(&row.entity)?;
        if let Some(resident) = self.fresh_resident(&entity, &row.id).await? {
            return Ok(resident);
        }
        self.identity.reconcile(row, |record| {
            self.encryption.on_loaded(&entity, record)?;
            for hook in &self.loaded_hooks {
                hook(record);
            }
            Ok(())
        })
    }

    async fn reconcile_all(&self, rows: Vec<EntityRecord>) -> Result<Vec<Arc<EntityRecord>>, Error> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(self.reconcile(row).await?);
        }
        Ok(records)
    }

    /// The resident instance of `(entity, id)` unless the row was written
    /// since it was registered, in which case it is evicted.
    async fn fresh_resident(
        &self,
        entity: &EntityDef,
        id: &Value,
    ) -> Result<Option<Arc<EntityRecord>>, Error> {
        let Some(resident) = self.identity.get(&entity.name, id) else {
            return Ok(None);
        };
        if self
            .cache
            .is_updated_since(&entity.qualified_name(), id, resident.loaded_at)
            .await?
        {
            debug!(entity = %entity.name, id = %id, "resident row is stale, reloading");
            self.identity.evict(&entity.name, id);
            return Ok(None);
        }
        Ok(Some(resident.record))
    }

    /// Rows from the providers, in the requested (or natural) order.
    ///
    /// For abstract types every implementation is queried concurrently and
    /// the results merged. A page window is widened per implementation and
    /// cut after the merge so the page is exact.
    async fn load_rows(
        &self,
        session: &Session,
        entity: &EntityDef,
        query: &Query,
    ) -> Result<Vec<EntityRecord>, Error> {
        let context = session.current();
        match self.providers.resolve(&self.catalog, entity)? {
            ProviderTarget::Single(provider) => {
                let mut rows = provider.get_list(query, &context).await?;
                if query.order_by.is_empty() {
                    sort_rows(&mut rows, &entity.natural_order(), &entity.identity_field);
                }
                Ok(rows)
            }
            ProviderTarget::FanOut(targets) => {
                debug!(implementations = targets.len(), "fanning out abstract query");
                let window_end = query.paging.map(|p| p.start_index.saturating_add(p.page_size));
                let context = &context;
                let loads = targets.iter().map(|(concrete, provider)| {
                    let mut sub = query.for_entity(concrete.name.clone());
                    if let Some(end) = window_end {
                        sub.paging = None;
                        sub.take = Some(end);
                    }
                    async move { provider.get_list(&sub, context).await }
                });
                let mut rows: Vec<EntityRecord> =
                    try_join_all(loads).await?.into_iter().flatten().collect();

                let order = if query.order_by.is_empty() {
                    entity.natural_order()
                } else {
                    query.order_by.clone()
                };
                sort_rows(&mut rows, &order, &entity.identity_field);

                if let Some(paging) = query.paging {
                    rows = rows
                        .into_iter()
                        .skip(paging.start_index as usize)
                        .take(paging.page_size as usize)
                        .collect();
                } else if let Some(take) = query.take {
                    rows.truncate(take as usize);
                }
                Ok(rows)
            }
        }
    }

    fn writable(&self, name: &str) -> Result<(Arc<EntityDef>, Arc<dyn DataProvider>), Error> {
        let entity = self.catalog.get(name)?;
        if entity.is_abstract() {
            return Err(Error::Usage(format!(
                "cannot write abstract type `{name}`; write a concrete implementation"
            )));
        }
        let provider = self.providers.provider_for(&entity.name)?;
        Ok((entity, provider))
    }

    fn persisted_form(&self, entity: &EntityDef, record: &EntityRecord) -> Result<EntityRecord, Error> {
        let mut persisted = record.clone();
        self.encryption.on_saving(entity, &mut persisted)?;
        Ok(persisted)
    }

    /// Drop cached copies of a written row and record its new version.
    async fn after_write(&self, entity: &EntityDef, id: &Value) -> Result<u64, Error> {
        let type_name = entity.qualified_name();
        if !id.is_null() {
            self.cache.remove(&type_name, id).await?;
        }
        self.invalidate_lists(entity).await?;
        if id.is_null() {
            return Ok(0);
        }
        Ok(self.cache.update_row_version(&type_name, id).await?)
    }

    async fn concurrency_failure(&self, entity: &EntityDef, id: &Value) -> Error {
        warn!(entity = %entity.name, id = %id, "write affected no rows, evicting cached copies");
        self.identity.evict(&entity.name, id);
        if let Err(e) = self.cache.remove(&entity.qualified_name(), id).await {
            warn!(error = %e, "failed to evict cached entity");
        }
        if let Err(e) = self.invalidate_lists(entity).await {
            warn!(error = %e, "failed to invalidate cached lists");
        }
        Error::Concurrency {
            entity: entity.name.clone(),
            id: id.to_key_string(),
        }
    }

    async fn invalidate_lists(&self, entity: &EntityDef) -> Result<u64, Error> {
        let mut removed = self.cache.remove_list(&entity.qualified_name()).await?;
        for parent in self.catalog.abstract_parents(&entity.name) {
            removed += self.cache.remove_list(&parent.qualified_name()).await?;
        }
        self.stats.record_invalidations(removed);
        debug!(entity = %entity.name, removed, "invalidated cached lists");
        Ok(removed)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("entities", &self.catalog.entity_names())
            .field("providers", &self.providers)
            .field("cache", &self.cache.backend_name())
            .field("resident", &self.identity.len())
            .field("encryption", &self.encryption)
            .finish()
    }
}

/// Stable sort by `order`; values that cannot be compared keep their order.
pub(crate) fn sort_rows(rows: &mut [EntityRecord], order: &[OrderSpec], identity_field: &str) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for spec in order {
            let left = sort_value(a, &spec.property, identity_field);
            let right = sort_value(b, &spec.property, identity_field);
            let ordering = left.compare(right).unwrap_or(Ordering::Equal);
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
}

fn sort_value<'r>(record: &'r EntityRecord, property: &str, identity_field: &str) -> &'r Value {
    if property == identity_field {
        return &record.id;
    }
    record.get(property).unwrap_or(&Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, name: &str, age: Option<i32>) -> EntityRecord {
        EntityRecord::new("Person", id)
            .with_field("FirstName", name)
            .with_field("Age", age)
    }

    fn ids(rows: &[EntityRecord]) -> Vec<i64> {
        rows.iter().filter_map(|r| r.id.as_i64()).collect()
    }

    #[test]
    fn test_sort_by_identity() {
        let mut rows = vec![row(3, "c", None), row(1, "a", None), row(2, "b", None)];
        sort_rows(&mut rows, &[OrderSpec::asc("ID")], "ID");
        assert_eq!(ids(&rows), vec![1, 2, 3]);
    }

    #[test]
    fn test_sort_multi_key_with_nulls() {
        let mut rows = vec![
            row(1, "a", Some(30)),
            row(2, "b", None),
            row(3, "c", Some(30)),
            row(4, "d", Some(20)),
        ];
        sort_rows(
            &mut rows,
            &[OrderSpec::desc("Age"), OrderSpec::asc("FirstName")],
            "ID",
        );
        assert_eq!(ids(&rows), vec![1, 3, 4, 2]);
    }

    #[test]
    fn test_sort_is_stable_for_incomparable() {
        let mut rows = vec![
            EntityRecord::new("Person", 1i64).with_field("Mixed", "x"),
            EntityRecord::new("Person", 2i64).with_field("Mixed", 5i32),
        ];
        sort_rows(&mut rows, &[OrderSpec::asc("Mixed")], "ID");
        assert_eq!(ids(&rows), vec![1, 2]);
    }
}
