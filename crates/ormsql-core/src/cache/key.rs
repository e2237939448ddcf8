//! Cache key layout.
//!
//! - Entity: `{type}|{id}`
//! - List: `{type}>List>{query key}`
//!
//! All lists of one type share the `{type}>List>` prefix so they can be
//! dropped together.

use std::time::{SystemTime, UNIX_EPOCH};

use ormsql_proto::Value;

/// Separator between type name and id in entity keys.
pub const ENTITY_SEPARATOR: char = '|';

/// Marker between type name and query key in list keys.
pub const LIST_MARKER: &str = ">List>";

/// Key of a single cached entity.
pub fn entity_key(type_name: &str, id: &Value) -> String {
    format!("{type_name}{ENTITY_SEPARATOR}{}", id.to_key_string())
}

/// Key of a cached query result list.
pub fn list_key(type_name: &str, key: &str) -> String {
    format!("{}{key}", list_prefix(type_name))
}

/// Prefix shared by every list key of a type.
pub fn list_prefix(type_name: &str) -> String {
    format!("{type_name}{LIST_MARKER}")
}

/// Current time in microseconds since Unix epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}
