//! PostgreSQL dialect.

use ormsql_proto::{Paging, Value};

use super::dialect::SqlDialect;

/// Double-quoted identifiers, case-insensitive `ILIKE` and `LIMIT`/`OFFSET`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_part(&self, part: &str) -> String {
        format!("\"{}\"", part.replace('"', "\"\""))
    }

    fn unquote_part(&self, part: &str) -> String {
        match part.strip_prefix('"').and_then(|p| p.strip_suffix('"')) {
            Some(inner) => inner.replace("\"\"", "\""),
            None => part.to_string(),
        }
    }

    fn is_quoted(&self, part: &str) -> bool {
        part.len() >= 2 && part.starts_with('"') && part.ends_with('"')
    }

    fn like_operator(&self) -> &'static str {
        "ILIKE"
    }

    fn escape_like(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            if matches!(c, '\\' | '%' | '_') {
                out.push('\\');
            }
            out.push(c);
        }
        out
    }

    fn parameter_type(&self, value: &Value) -> &'static str {
        match value {
            Value::Null => "unknown",
            Value::Bool(_) => "boolean",
            Value::Int32(_) => "integer",
            Value::Int64(_) => "bigint",
            Value::Float32(_) => "real",
            Value::Float64(_) => "double precision",
            Value::String(_) => "text",
            Value::Bytes(_) => "bytea",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
            Value::List(_) => "unknown",
        }
    }

    fn top_clause(&self, _take: Option<u32>, _paging: Option<&Paging>) -> Option<String> {
        None
    }

    fn limit_clause(&self, take: Option<u32>, paging: Option<&Paging>) -> Option<String> {
        match (take, paging) {
            (_, Some(p)) => Some(format!("LIMIT {} OFFSET {}", p.page_size, p.start_index)),
            (Some(take), None) => Some(format!("LIMIT {take}")),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_id() {
        let d = PostgresDialect;
        assert_eq!(d.safe_id("Person"), "\"Person\"");
        assert_eq!(d.safe_id("public.Person"), "\"public\".\"Person\"");
        assert_eq!(d.safe_id("\"Person\""), "\"Person\"");
        assert_eq!(d.unescape_id("\"public\".\"Person\""), "public.Person");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(PostgresDialect.escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }

    #[test]
    fn test_row_limits() {
        let d = PostgresDialect;
        let page = Paging::new(20, 10);

        assert_eq!(d.top_clause(Some(5), None), None);
        assert_eq!(d.limit_clause(Some(5), None), Some("LIMIT 5".to_string()));
        assert_eq!(
            d.limit_clause(Some(5), Some(&page)),
            Some("LIMIT 10 OFFSET 20".to_string())
        );
        assert_eq!(d.limit_clause(None, None), None);
    }

    #[test]
    fn test_case_insensitive_like() {
        assert_eq!(PostgresDialect.like_operator(), "ILIKE");
    }
}
