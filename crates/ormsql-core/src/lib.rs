//! ORMSQL Core - SQL generation, cache-aware query execution and identity map.
//!
//! Entity types are described once in a [`Catalog`]. Queries built with the
//! `ormsql_proto` model are rendered to dialect SQL by a [`SqlGenerator`] and
//! executed through [`Database`], which decides per call whether a result list
//! may come from the cache, keeps one canonical instance per row in the
//! identity map and invalidates cached lists on writes.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod encryption;
pub mod error;
pub mod provider;
pub mod query;
pub mod sql;

pub use cache::{CacheError, CacheProvider, MemoryCacheProvider};
pub use catalog::{
    Catalog, ComputedField, EntityDef, FieldDef, FieldType, LifecycleRules, ScalarType,
    SOFT_DELETE_FIELD,
};
pub use config::{CacheBackend, CacheConfig, EngineConfig, DEFAULT_CONNECTION};
pub use context::{ContextGuard, DbContext, Session};
pub use encryption::{AesGcmCipher, EncryptionInterceptor, PropertyCipher};
pub use error::Error;
pub use provider::{
    DataProvider, ProviderRegistry, ProviderTarget, Row, SqlDataProvider, SqlExecutor,
};
pub use query::{CacheStats, Database, DatabaseBuilder, EntityKey, IdentityMap, LoadedHook};
pub use sql::{
    NestedPathResolver, Parameters, PostgresDialect, SqlCommand, SqlDialect, SqlGenerator,
    SqlParameter, SqlServerDialect,
};

/// Re-export of the query model.
pub use ormsql_proto as proto;
