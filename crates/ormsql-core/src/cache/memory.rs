//! In-process cache provider.

use async_trait::async_trait;
use dashmap::DashMap;
use ormsql_proto::{EntityRecord, Value};
use tracing::trace;

use super::key::{current_timestamp, entity_key, list_key, list_prefix};
use super::provider::{CacheError, CacheProvider};

/// Cache held in process memory.
///
/// Entries never expire; they are dropped by invalidation only. Row versions
/// are tracked so stale identity-map entries can be detected.
#[derive(Debug, Default)]
pub struct MemoryCacheProvider {
    entities: DashMap<String, EntityRecord>,
    lists: DashMap<String, Vec<EntityRecord>>,
    versions: DashMap<String, u64>,
}

impl MemoryCacheProvider {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of cached lists.
    pub fn list_count(&self) -> usize {
        self.lists.len()
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn add(&self, type_name: &str, record: &EntityRecord) -> Result<(), CacheError> {
        self.entities
            .insert(entity_key(type_name, &record.id), record.clone());
        Ok(())
    }

    async fn get(&self, type_name: &str, id: &Value) -> Result<Option<EntityRecord>, CacheError> {
        Ok(self
            .entities
            .get(&entity_key(type_name, id))
            .map(|entry| entry.value().clone()))
    }

    async fn remove(&self, type_name: &str, id: &Value) -> Result<(), CacheError> {
        self.entities.remove(&entity_key(type_name, id));
        Ok(())
    }

    async fn add_list(
        &self,
        type_name: &str,
        key: &str,
        records: &[EntityRecord],
    ) -> Result<(), CacheError> {
        self.lists.insert(list_key(type_name, key), records.to_vec());
        Ok(())
    }

    async fn get_list(
        &self,
        type_name: &str,
        key: &str,
    ) -> Result<Option<Vec<EntityRecord>>, CacheError> {
        Ok(self
            .lists
            .get(&list_key(type_name, key))
            .map(|entry| entry.value().clone()))
    }

    async fn remove_list(&self, type_name: &str) -> Result<u64, CacheError> {
        let prefix = list_prefix(type_name);
        let keys: Vec<String> = self
            .lists
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.key().clone())
            .collect();
        let mut removed = 0;
        for key in keys {
            if self.lists.remove(&key).is_some() {
                removed += 1;
            }
        }
        trace!(type_name, removed, "removed cached lists");
        Ok(removed)
    }

    async fn clear_all(&self) -> Result<(), CacheError> {
        self.entities.clear();
        self.lists.clear();
        self.versions.clear();
        Ok(())
    }

    async fn is_updated_since(
        &self,
        type_name: &str,
        id: &Value,
        since: u64,
    ) -> Result<bool, CacheError> {
        Ok(self
            .versions
            .get(&entity_key(type_name, id))
            .is_some_and(|version| *version >= since))
    }

    async fn update_row_version(&self, type_name: &str, id: &Value) -> Result<u64, CacheError> {
        let key = entity_key(type_name, id);
        let now = current_timestamp();
        // Keep versions strictly increasing even within one clock tick.
        let version = *self
            .versions
            .entry(key)
            .and_modify(|v| *v = (*v + 1).max(now))
            .or_insert(now);
        Ok(version)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
