//! Redis key construction.

use ormsql_core::cache::{entity_key, list_key, list_prefix};
use ormsql_proto::Value;

/// Query keys longer than this are stored under their digest.
pub const MAX_QUERY_KEY_LEN: usize = 256;

const DIGEST_MARKER: char = '#';

/// Builds prefixed keys.
#[derive(Debug, Clone)]
pub(crate) struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub(crate) fn entity(&self, type_name: &str, id: &Value) -> String {
        format!("{}{}", self.prefix, entity_key(type_name, id))
    }

    pub(crate) fn list(&self, type_name: &str, key: &str) -> String {
        if key.len() <= MAX_QUERY_KEY_LEN {
            return format!("{}{}", self.prefix, list_key(type_name, key));
        }
        let digest = blake3::hash(key.as_bytes());
        format!(
            "{}{}{DIGEST_MARKER}{}",
            self.prefix,
            list_prefix(type_name),
            hex::encode(digest.as_bytes())
        )
    }

    /// SCAN pattern matching every list key of a type.
    pub(crate) fn list_pattern(&self, type_name: &str) -> String {
        let mut pattern = escape_glob(&self.prefix);
        pattern.push_str(&escape_glob(&list_prefix(type_name)));
        pattern.push('*');
        pattern
    }

    /// SCAN pattern matching every key of this provider.
    pub(crate) fn all_pattern(&self) -> String {
        format!("{}*", escape_glob(&self.prefix))
    }
}

/// Escape Redis glob metacharacters.
fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entity_and_list_keys() {
        let keys = KeySpace::new("ormsql:");
        assert_eq!(keys.entity("Crm.Person", &Value::Int64(7)), "ormsql:Crm.Person|7");
        assert_eq!(
            keys.list("Crm.Person", "Crm.Person|Age MoreThan 18"),
            "ormsql:Crm.Person>List>Crm.Person|Age MoreThan 18"
        );
    }

    #[test]
    fn test_long_list_key_is_hashed_under_type_prefix() {
        let keys = KeySpace::new("ormsql:");
        let long = format!("Crm.Person|{}", "x".repeat(MAX_QUERY_KEY_LEN));
        let key = keys.list("Crm.Person", &long);

        assert!(key.starts_with("ormsql:Crm.Person>List>#"));
        assert_eq!(key.len(), "ormsql:Crm.Person>List>#".len() + 64);
        assert_eq!(key, keys.list("Crm.Person", &long));
        assert_ne!(key, keys.list("Crm.Person", &format!("{long}y")));
    }

    #[test]
    fn test_patterns_escape_metacharacters() {
        let keys = KeySpace::new("app[1]:");
        assert_eq!(keys.list_pattern("Crm.Person"), "app\\[1\\]:Crm.Person>List>*");
        assert_eq!(keys.all_pattern(), "app\\[1\\]:*");
        assert_eq!(escape_glob("a*b?c\\"), "a\\*b\\?c\\\\");
    }
}
