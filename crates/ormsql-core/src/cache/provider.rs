//! Cache provider contract.

use async_trait::async_trait;
use ormsql_proto::{EntityRecord, Value};
use thiserror::Error;

/// Errors raised by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached.
    #[error("cache connection failed: {0}")]
    Connection(String),

    /// A backend command failed.
    #[error("cache operation failed: {0}")]
    Backend(String),

    /// A stored entry could not be (de)serialized.
    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage for single entities and query result lists.
///
/// Entries hold the persisted form of a row (encrypted properties stay
/// encrypted). Single entities are keyed by `(type, id)`; lists by
/// `(type, key)` where `key` is derived from the query. Every list of a type
/// can be dropped at once with [`remove_list`](Self::remove_list).
///
/// Implementations must be safe to share across tasks.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Store one entity.
    async fn add(&self, type_name: &str, record: &EntityRecord) -> Result<(), CacheError>;

    /// Fetch one entity.
    async fn get(&self, type_name: &str, id: &Value) -> Result<Option<EntityRecord>, CacheError>;

    /// Drop one entity.
    async fn remove(&self, type_name: &str, id: &Value) -> Result<(), CacheError>;

    /// Store a query result list.
    async fn add_list(
        &self,
        type_name: &str,
        key: &str,
        records: &[EntityRecord],
    ) -> Result<(), CacheError>;

    /// Fetch a query result list.
    async fn get_list(
        &self,
        type_name: &str,
        key: &str,
    ) -> Result<Option<Vec<EntityRecord>>, CacheError>;

    /// Drop every list of a type. Returns how many were removed.
    async fn remove_list(&self, type_name: &str) -> Result<u64, CacheError>;

    /// Drop everything.
    async fn clear_all(&self) -> Result<(), CacheError>;

    /// Whether the row was written at or after `since` (microseconds since
    /// epoch). Ties count as updated.
    async fn is_updated_since(
        &self,
        type_name: &str,
        id: &Value,
        since: u64,
    ) -> Result<bool, CacheError>;

    /// Record that the row was written now and return the recorded version.
    ///
    /// Backends that do not track versions return 0.
    async fn update_row_version(&self, type_name: &str, id: &Value) -> Result<u64, CacheError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}
