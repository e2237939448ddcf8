//! ORMSQL - SQL generation and cache-coherent entity loading.
//!
//! This crate re-exports the query model and the engine, and wires the cache
//! backend named in configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ormsql::{Catalog, Database, EngineConfig, Error, Query, Criterion, Session};
//!
//! # async fn run(catalog: Arc<Catalog>, provider: Arc<dyn ormsql::DataProvider>) -> Result<(), Error> {
//! let config = EngineConfig::from_settings([
//!     ("ConnectionStrings:AppDatabase", "Server=db;Database=App"),
//!     ("Database:Cache:Provider", "InProcess"),
//! ])?;
//!
//! let db = Database::builder(catalog)
//!     .default_provider(provider)
//!     .cache(ormsql::connect_cache(&config.cache).await?)
//!     .build()?;
//!
//! let session = Session::new(config.default_context());
//! let _adults = db
//!     .get_list(&session, &Query::new("Person").with_criterion(Criterion::gt("Age", 17i32)))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub use ormsql_core::*;
pub use ormsql_proto::{
    BinaryOperator, CompositeCriterion, Criterion, EntityRecord, FilterFunction, Include,
    OrderDirection, OrderSpec, Paging, Query, RawCriterion, SimpleCriterion, Value,
};

#[cfg(feature = "redis")]
pub use ormsql_redis::{RedisCacheProvider, RedisConfig};

/// Open the cache backend selected by `config`.
///
/// Asking for Redis without the `redis` feature, or with an unreachable
/// server, is an error rather than a silent fallback.
pub async fn connect_cache(config: &CacheConfig) -> Result<Arc<dyn CacheProvider>, Error> {
    match config.backend {
        CacheBackend::InProcess => Ok(Arc::new(MemoryCacheProvider::new())),
        CacheBackend::Redis => connect_redis(config).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &CacheConfig) -> Result<Arc<dyn CacheProvider>, Error> {
    let redis = RedisConfig::from_cache_config(config)?;
    let provider = RedisCacheProvider::connect(&redis).await?;
    tracing::info!(url = %redis.url, "using redis cache");
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_: &CacheConfig) -> Result<Arc<dyn CacheProvider>, Error> {
    Err(Error::Configuration(
        "Redis cache requested but ormsql was built without the `redis` feature".to_string(),
    ))
}
