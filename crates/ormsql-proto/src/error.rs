//! Query model errors.

use thiserror::Error;

/// Errors raised while validating a query before it is compiled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Paging was requested without an explicit sort order.
    #[error("paging a query on `{entity}` requires an explicit order by")]
    PagingWithoutOrder { entity: String },

    /// A page size of zero was requested.
    #[error("page size must be greater than zero for `{entity}`")]
    EmptyPage { entity: String },

    /// A criterion is structurally invalid.
    #[error("invalid criterion: {0}")]
    InvalidCriterion(String),
}
