//! ORMSQL Redis - distributed cache provider.
//!
//! [`RedisCacheProvider`] implements the `ormsql-core` cache contract on a
//! shared Redis server so that several processes see the same cached entities
//! and lists, and a write in one process invalidates lists everywhere.
//!
//! # Key layout
//!
//! Every key starts with the configured prefix (`ormsql:` by default):
//!
//! - entity: `{prefix}{type}|{id}` holding one JSON record
//! - list: `{prefix}{type}>List>{query key}` holding a JSON array
//!
//! Query keys longer than [`MAX_QUERY_KEY_LEN`] are replaced by their BLAKE3
//! digest, keeping the type prefix so pattern invalidation still finds them.
//!
//! # Row versions
//!
//! No shared version store is kept: `is_updated_since` always reports the
//! row as fresh and `update_row_version` records nothing and returns 0.

mod config;
mod keys;
mod provider;

pub use config::{RedisConfig, DEFAULT_KEY_PREFIX, DEFAULT_SCAN_COUNT};
pub use keys::MAX_QUERY_KEY_LEN;
pub use provider::RedisCacheProvider;
