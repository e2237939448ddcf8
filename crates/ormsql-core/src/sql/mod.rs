//! Dialect SQL generation.
//!
//! [`SqlGenerator`] renders a [`Query`](ormsql_proto::Query) into a single
//! parameterized statement. Dotted property paths become correlated `EXISTS`
//! subqueries through [`NestedPathResolver`]; everything backend-specific is
//! behind [`SqlDialect`].

mod dialect;
mod generator;
mod nested;
mod params;
mod postgres;
mod sqlserver;

pub use dialect::SqlDialect;
pub use generator::{SqlCommand, SqlGenerator};
pub use nested::{NestedPathResolver, ResolvedPath, SubqueryMapper};
pub use params::{Parameters, SqlParameter};
pub use postgres::PostgresDialect;
pub use sqlserver::SqlServerDialect;
