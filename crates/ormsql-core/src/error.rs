//! Core error types.

use thiserror::Error;

use crate::cache::CacheError;

/// Errors raised by the query engine.
///
/// Nothing here is retried internally. SQL execution, cache I/O and cipher
/// failures are propagated to the caller with context attached.
#[derive(Debug, Error)]
pub enum Error {
    /// The query itself is malformed (e.g. paging without order).
    #[error("invalid query: {0}")]
    Query(#[from] ormsql_proto::Error),

    /// No entity type with this name is registered.
    #[error("unknown entity type `{0}`")]
    UnknownEntity(String),

    /// The entity type has no such property.
    #[error("`{entity}` has no property `{property}`")]
    UnknownProperty { entity: String, property: String },

    /// Caller-caused misuse that is not a structural query error.
    #[error("usage error: {0}")]
    Usage(String),

    /// No data provider can serve this entity type.
    #[error("no data provider implements `{0}`")]
    NoProvider(String),

    /// A write affected zero rows: the row was changed or deleted concurrently.
    #[error("`{entity}` row `{id}` was changed or deleted by another operation")]
    Concurrency { entity: String, id: String },

    /// Cache backend failure.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Encryption or decryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Invalid configuration or entity metadata.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The underlying data provider failed.
    #[error("data provider error: {0}")]
    Provider(String),
}

impl Error {
    /// Whether the error was caused by the caller and should not be retried.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::Query(_)
                | Error::UnknownEntity(_)
                | Error::UnknownProperty { .. }
                | Error::Usage(_)
        )
    }

    /// Whether the error signals a concurrent modification.
    pub fn is_concurrency(&self) -> bool {
        matches!(self, Error::Concurrency { .. })
    }

    pub(crate) fn unknown_property(entity: &str, property: &str) -> Self {
        Error::UnknownProperty {
            entity: entity.to_string(),
            property: property.to_string(),
        }
    }
}
