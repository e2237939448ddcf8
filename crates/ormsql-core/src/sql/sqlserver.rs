//! SQL Server dialect.

use ormsql_proto::{Paging, Value};

use super::dialect::SqlDialect;

/// Bracket-quoted identifiers, `TOP n` and `OFFSET .. FETCH` paging.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlDialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote_part(&self, part: &str) -> String {
        format!("[{}]", part.replace(']', "]]"))
    }

    fn unquote_part(&self, part: &str) -> String {
        match part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
            Some(inner) => inner.replace("]]", "]"),
            None => part.to_string(),
        }
    }

    fn is_quoted(&self, part: &str) -> bool {
        part.len() >= 2 && part.starts_with('[') && part.ends_with(']')
    }

    fn escape_like(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            match c {
                '[' => out.push_str("[[]"),
                '%' => out.push_str("[%]"),
                '_' => out.push_str("[_]"),
                other => out.push(other),
            }
        }
        out
    }

    fn parameter_type(&self, value: &Value) -> &'static str {
        match value {
            Value::Null => "sql_variant",
            Value::Bool(_) => "bit",
            Value::Int32(_) => "int",
            Value::Int64(_) => "bigint",
            Value::Float32(_) => "real",
            Value::Float64(_) => "float",
            Value::String(_) => "nvarchar",
            Value::Bytes(_) => "varbinary",
            Value::Timestamp(_) => "datetime2",
            Value::Uuid(_) => "uniqueidentifier",
            Value::List(_) => "sql_variant",
        }
    }

    fn top_clause(&self, take: Option<u32>, paging: Option<&Paging>) -> Option<String> {
        match (take, paging) {
            (Some(take), None) => Some(format!("TOP {take}")),
            _ => None,
        }
    }

    fn limit_clause(&self, _take: Option<u32>, paging: Option<&Paging>) -> Option<String> {
        paging.map(|p| {
            format!(
                "OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                p.start_index, p.page_size
            )
        })
    }

    fn supports_row_version(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_id() {
        let d = SqlServerDialect;
        assert_eq!(d.safe_id("Person"), "[Person]");
        assert_eq!(d.safe_id("dbo.Person"), "[dbo].[Person]");
        assert_eq!(d.safe_id("[Person]"), "[Person]");
        assert_eq!(d.safe_id("Odd]Name"), "[Odd]]Name]");
    }

    #[test]
    fn test_unescape_id() {
        let d = SqlServerDialect;
        assert_eq!(d.unescape_id("[dbo].[Person]"), "dbo.Person");
        assert_eq!(d.unescape_id("[Odd]]Name]"), "Odd]Name");
        assert_eq!(d.unescape_id("Plain"), "Plain");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(SqlServerDialect.escape_like("50%_[x]"), "50[%][_][[]x]");
    }

    #[test]
    fn test_row_limits() {
        let d = SqlServerDialect;
        let page = Paging::new(20, 10);

        assert_eq!(d.top_clause(Some(5), None), Some("TOP 5".to_string()));
        assert_eq!(d.top_clause(Some(5), Some(&page)), None);
        assert_eq!(d.limit_clause(Some(5), None), None);
        assert_eq!(
            d.limit_clause(None, Some(&page)),
            Some("OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY".to_string())
        );
    }
}
