//! ORMSQL query model.
//!
//! This crate holds the backend-neutral data structures that callers use to
//! describe what they want loaded: criteria trees, queries and the entity
//! records that come back. Nothing in here knows about SQL or performs I/O.
//!
//! # Modules
//!
//! - [`value`] - Runtime values used in criteria and records
//! - [`criteria`] - Simple, composite and raw criteria
//! - [`query`] - Query shape: criteria, sort, take, paging and includes
//! - [`record`] - Dynamic entity rows keyed by entity type and identifier
//! - [`error`] - Model validation errors
//!
//! # Example
//!
//! ```
//! use ormsql_proto::{Criterion, OrderSpec, Query};
//!
//! let query = Query::new("Order")
//!     .with_criterion(Criterion::eq("Customer.Country", "UK"))
//!     .with_criterion(Criterion::gt("Total", 100i64))
//!     .with_order(OrderSpec::desc("PlacedAt"))
//!     .take(20);
//!
//! assert_eq!(query.criteria.len(), 2);
//! assert!(query.validate().is_ok());
//! ```

pub mod criteria;
pub mod error;
pub mod query;
pub mod record;
pub mod value;

pub use criteria::{
    BinaryOperator, CompositeCriterion, Criterion, FilterFunction, RawCriterion, SimpleCriterion,
};
pub use error::Error;
pub use query::{Include, OrderDirection, OrderSpec, Paging, Query};
pub use record::EntityRecord;
pub use value::Value;
