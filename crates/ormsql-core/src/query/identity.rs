//! Identity map: one canonical in-memory instance per loaded row.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ormsql_proto::{EntityRecord, Value};

use crate::cache::current_timestamp;
use crate::error::Error;

/// Identity of a row: entity type and identifier text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    entity: String,
    id: String,
}

impl EntityKey {
    /// Key for `(entity, id)`.
    pub fn new(entity: impl Into<String>, id: &Value) -> Self {
        Self {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Key of a record.
    pub fn of(record: &EntityRecord) -> Self {
        Self::new(record.entity.clone(), &record.id)
    }
}

/// A registered instance and when it was registered.
#[derive(Debug, Clone)]
pub struct Resident {
    /// The canonical instance.
    pub record: Arc<EntityRecord>,
    /// Registration time (microseconds since epoch).
    pub loaded_at: u64,
}

/// Canonical instances by identity.
///
/// Once a row is registered, later loads of the same row resolve to the
/// registered instance and the freshly loaded copy is discarded.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: DashMap<EntityKey, Resident>,
}

impl IdentityMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// The resident instance for `(entity, id)`.
    pub fn get(&self, entity: &str, id: &Value) -> Option<Resident> {
        self.entries
            .get(&EntityKey::new(entity, id))
            .map(|entry| entry.value().clone())
    }

    /// Resolve a loaded row to its canonical instance.
    ///
    /// A resident instance wins. Otherwise `on_loaded` runs on the new row
    /// (decryption, notifications) and the row is registered; if it fails,
    /// nothing is registered.
    pub fn reconcile<F>(&self, record: EntityRecord, on_loaded: F) -> Result<Arc<EntityRecord>, Error>
    where
        F: FnOnce(&mut EntityRecord) -> Result<(), Error>,
    {
        let key = EntityKey::of(&record);
        if let Some(resident) = self.entries.get(&key) {
            return Ok(resident.record.clone());
        }

        let mut record = record;
        on_loaded(&mut record)?;

        match self.entries.entry(key) {
            Entry::Occupied(existing) => Ok(existing.get().record.clone()),
            Entry::Vacant(slot) => {
                let record = Arc::new(record);
                slot.insert(Resident {
                    record: record.clone(),
                    loaded_at: current_timestamp(),
                });
                Ok(record)
            }
        }
    }

    /// Register a just-written `record` as the canonical instance, replacing
    /// any resident.
    ///
    /// `version` is the row version the write was recorded under; the
    /// instance is stamped after it so the write does not mark its own
    /// result stale.
    pub fn replace(&self, record: EntityRecord, version: u64) -> Arc<EntityRecord> {
        let key = EntityKey::of(&record);
        let record = Arc::new(record);
        self.entries.insert(
            key,
            Resident {
                record: record.clone(),
                loaded_at: current_timestamp().max(version.saturating_add(1)),
            },
        );
        record
    }

    /// Drop the resident instance for `(entity, id)`.
    pub fn evict(&self, entity: &str, id: &Value) -> bool {
        self.entries.remove(&EntityKey::new(entity, id)).is_some()
    }

    /// Drop every resident instance of a type.
    pub fn evict_type(&self, entity: &str) {
        self.entries.retain(|key, _| key.entity != entity);
    }

    /// Whether `(entity, id)` is resident.
    pub fn contains(&self, entity: &str, id: &Value) -> bool {
        self.entries.contains_key(&EntityKey::new(entity, id))
    }

    /// Number of resident instances.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is resident.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jo(name: &str) -> EntityRecord {
        EntityRecord::new("Person", 1i64).with_field("FirstName", name)
    }

    #[test]
    fn test_first_load_registers() {
        let map = IdentityMap::new();
        let mut calls = 0;
        let record = map
            .reconcile(jo("Jo"), |_| {
                calls += 1;
                Ok(())
            })
            .unwrap();

        assert_eq!(calls, 1);
        assert!(map.contains("Person", &Value::Int64(1)));
        assert_eq!(record.get("FirstName"), Some(&Value::from("Jo")));
    }

    #[test]
    fn test_resident_wins() {
        let map = IdentityMap::new();
        let first = map.reconcile(jo("Jo"), |_| Ok(())).unwrap();

        let mut notified = false;
        let second = map
            .reconcile(jo("Changed"), |_| {
                notified = true;
                Ok(())
            })
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.get("FirstName"), Some(&Value::from("Jo")));
        assert!(!notified);
    }

    #[test]
    fn test_failed_hook_registers_nothing() {
        let map = IdentityMap::new();
        let result = map.reconcile(jo("Jo"), |_| Err(Error::Encryption("bad".into())));
        assert!(result.is_err());
        assert!(map.is_empty());
    }

    #[test]
    fn test_hook_mutation_is_kept() {
        let map = IdentityMap::new();
        let record = map
            .reconcile(jo("encrypted"), |r| {
                r.set("FirstName", "clear");
                Ok(())
            })
            .unwrap();
        assert_eq!(record.get("FirstName"), Some(&Value::from("clear")));
    }

    #[test]
    fn test_replace_and_evict() {
        let map = IdentityMap::new();
        let first = map.reconcile(jo("Jo"), |_| Ok(())).unwrap();
        let replaced = map.replace(jo("Joanna"), 0);

        assert!(!Arc::ptr_eq(&first, &replaced));
        let resident = map.get("Person", &Value::Int64(1)).unwrap();
        assert!(Arc::ptr_eq(&resident.record, &replaced));

        assert!(map.evict("Person", &Value::Int64(1)));
        assert!(!map.evict("Person", &Value::Int64(1)));
    }

    #[test]
    fn test_replace_is_stamped_after_its_version() {
        let map = IdentityMap::new();
        let version = current_timestamp() + 1_000_000;
        map.replace(jo("Jo"), version);
        let resident = map.get("Person", &Value::Int64(1)).unwrap();
        assert!(resident.loaded_at > version);
    }

    #[test]
    fn test_evict_type() {
        let map = IdentityMap::new();
        map.replace(jo("Jo"), 0);
        map.replace(EntityRecord::new("Company", 1i64), 0);
        map.evict_type("Person");
        assert_eq!(map.len(), 1);
        assert!(map.contains("Company", &Value::Int64(1)));
    }

    #[test]
    fn test_string_and_int_ids_differ() {
        let map = IdentityMap::new();
        map.replace(EntityRecord::new("Person", 42i64), 0);
        assert!(!map.contains("Person", &Value::from("42")));
    }
}
