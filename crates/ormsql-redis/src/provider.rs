//! Redis implementation of the cache contract.

use async_trait::async_trait;
use ormsql_core::cache::{CacheError, CacheProvider};
use ormsql_proto::{EntityRecord, Value};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, instrument, trace};

use crate::config::RedisConfig;
use crate::keys::KeySpace;

/// Distributed cache over a multiplexed Redis connection.
///
/// The connection manager reconnects on its own; a failed command surfaces
/// as [`CacheError::Backend`] and is not retried here.
#[derive(Clone)]
pub struct RedisCacheProvider {
    connection: ConnectionManager,
    keys: KeySpace,
    scan_count: usize,
}

impl RedisCacheProvider {
    /// Connect to the server in `config`.
    ///
    /// An unreachable server is an error: there is no silent fallback to an
    /// in-process cache.
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| CacheError::Connection(format!("{}: {e}", config.url)))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Connection(format!("{}: {e}", config.url)))?;
        debug!(url = %config.url, prefix = %config.key_prefix, "connected to redis");
        Ok(Self {
            connection,
            keys: KeySpace::new(config.key_prefix.clone()),
            scan_count: config.scan_count.max(1),
        })
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let mut connection = self.connection.clone();
        let payload: Option<String> = connection.get(key).await.map_err(backend)?;
        payload
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(CacheError::from)
    }

    async fn write(&self, key: &str, payload: String) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        let _: () = connection.set(key, payload).await.map_err(backend)?;
        Ok(())
    }

    /// Delete every key matching `pattern`, one SCAN batch at a time.
    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut connection = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut removed = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(self.scan_count)
                .query_async(&mut connection)
                .await
                .map_err(backend)?;
            if !keys.is_empty() {
                let deleted: u64 = connection.del(&keys).await.map_err(backend)?;
                removed += deleted;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        trace!(pattern, removed, "deleted matching keys");
        Ok(removed)
    }
}

fn backend(error: redis::RedisError) -> CacheError {
    CacheError::Backend(error.to_string())
}

#[async_trait]
impl CacheProvider for RedisCacheProvider {
    async fn add(&self, type_name: &str, record: &EntityRecord) -> Result<(), CacheError> {
        let payload = serde_json::to_string(record)?;
        self.write(&self.keys.entity(type_name, &record.id), payload)
            .await
    }

    async fn get(&self, type_name: &str, id: &Value) -> Result<Option<EntityRecord>, CacheError> {
        self.read(&self.keys.entity(type_name, id)).await
    }

    async fn remove(&self, type_name: &str, id: &Value) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        let _: u64 = connection
            .del(self.keys.entity(type_name, id))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn add_list(
        &self,
        type_name: &str,
        key: &str,
        records: &[EntityRecord],
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(records)?;
        self.write(&self.keys.list(type_name, key), payload).await
    }

    async fn get_list(
        &self,
        type_name: &str,
        key: &str,
    ) -> Result<Option<Vec<EntityRecord>>, CacheError> {
        self.read(&self.keys.list(type_name, key)).await
    }

    #[instrument(skip(self))]
    async fn remove_list(&self, type_name: &str) -> Result<u64, CacheError> {
        self.delete_matching(&self.keys.list_pattern(type_name)).await
    }

    async fn clear_all(&self) -> Result<(), CacheError> {
        let removed = self.delete_matching(&self.keys.all_pattern()).await?;
        debug!(removed, "cleared redis cache");
        Ok(())
    }

    async fn is_updated_since(&self, _: &str, _: &Value, _: u64) -> Result<bool, CacheError> {
        Ok(false)
    }

    async fn update_row_version(&self, _: &str, _: &Value) -> Result<u64, CacheError> {
        Ok(0)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisCacheProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheProvider")
            .field("keys", &self.keys)
            .field("scan_count", &self.scan_count)
            .finish()
    }
}
