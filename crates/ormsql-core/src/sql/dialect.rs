//! Dialect abstraction for SQL generation.

use std::fmt;

use ormsql_proto::{Paging, Value};

/// Per-backend SQL syntax.
///
/// The generator is written once against this trait; each backend supplies
/// identifier quoting, parameter naming, pattern matching and row limiting.
pub trait SqlDialect: Send + Sync + fmt::Debug {
    /// Dialect name for logging.
    fn name(&self) -> &'static str;

    /// Quote one identifier part.
    fn quote_part(&self, part: &str) -> String;

    /// Remove quoting from one identifier part.
    fn unquote_part(&self, part: &str) -> String;

    /// Quote an identifier, one dot-separated part at a time.
    ///
    /// Parts that are already quoted are left untouched, so quoting is
    /// idempotent.
    fn safe_id(&self, id: &str) -> String {
        id.split('.')
            .map(|part| {
                if self.is_quoted(part) {
                    part.to_string()
                } else {
                    self.quote_part(part)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Inverse of [`safe_id`](Self::safe_id).
    fn unescape_id(&self, id: &str) -> String {
        id.split('.')
            .map(|part| self.unquote_part(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Whether `part` is already quoted.
    fn is_quoted(&self, part: &str) -> bool;

    /// Prefix that marks a named parameter in SQL text.
    fn parameter_prefix(&self) -> &'static str {
        "@"
    }

    /// Operator used for `Contains`, `BeginsWith` and `EndsWith`.
    fn like_operator(&self) -> &'static str {
        "LIKE"
    }

    /// Escape `%`, `_` and the dialect's escape characters in a pattern operand.
    fn escape_like(&self, value: &str) -> String;

    /// Native type name for a parameter value.
    fn parameter_type(&self, value: &Value) -> &'static str;

    /// Clause inserted right after `SELECT` to cap the row count.
    fn top_clause(&self, take: Option<u32>, paging: Option<&Paging>) -> Option<String>;

    /// Clause appended after `ORDER BY` to cap or window the rows.
    fn limit_clause(&self, take: Option<u32>, paging: Option<&Paging>) -> Option<String>;

    /// Whether updates should be guarded by the row-version column.
    fn supports_row_version(&self) -> bool {
        false
    }
}
