//! Entity metadata.
//!
//! The catalog describes each mapped type: its table, alias, fields,
//! associations, lifecycle rules and, for abstract types, the concrete
//! implementations that queries fan out to.

mod catalog;
mod entity;
mod field;
mod types;

pub use catalog::Catalog;
pub use entity::{EntityDef, LifecycleRules, SOFT_DELETE_FIELD};
pub use field::{ComputedField, FieldDef};
pub use types::{FieldType, ScalarType};
