//! Criterion tree for filtering entities.
//!
//! A [`Criterion`] is either a single predicate on a (possibly dotted)
//! property path, a binary combination of two criteria, or a raw SQL escape
//! hatch. The tree is pure data; the SQL generator in `ormsql-core` is the
//! only component that turns it into backend text.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Comparison applied by a [`SimpleCriterion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterFunction {
    /// Equal to the value (or `IS NULL` for a null value).
    Is,
    /// Not equal to the value (null rows match too).
    IsNot,
    /// String contains the value.
    Contains,
    /// String does not contain the value.
    NotContains,
    /// String starts with the value.
    BeginsWith,
    /// String ends with the value.
    EndsWith,
    /// Member of a set of values.
    In,
    /// Not a member of a set of values.
    NotIn,
    /// Strictly smaller than the value.
    LessThan,
    /// Smaller than or equal to the value.
    LessThanOrEqual,
    /// Strictly bigger than the value.
    MoreThan,
    /// Bigger than or equal to the value.
    MoreThanOrEqual,
}

impl FilterFunction {
    /// Stable name used in canonical criterion text.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterFunction::Is => "Is",
            FilterFunction::IsNot => "IsNot",
            FilterFunction::Contains => "Contains",
            FilterFunction::NotContains => "NotContains",
            FilterFunction::BeginsWith => "BeginsWith",
            FilterFunction::EndsWith => "EndsWith",
            FilterFunction::In => "In",
            FilterFunction::NotIn => "NotIn",
            FilterFunction::LessThan => "LessThan",
            FilterFunction::LessThanOrEqual => "LessThanOrEqual",
            FilterFunction::MoreThan => "MoreThan",
            FilterFunction::MoreThanOrEqual => "MoreThanOrEqual",
        }
    }

    /// Whether this function wraps its value in a wildcard pattern.
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            FilterFunction::Contains
                | FilterFunction::NotContains
                | FilterFunction::BeginsWith
                | FilterFunction::EndsWith
        )
    }

    /// Whether this function takes a set of values.
    pub fn is_set(&self) -> bool {
        matches!(self, FilterFunction::In | FilterFunction::NotIn)
    }
}

impl fmt::Display for FilterFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean operator joining the two sides of a [`CompositeCriterion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    /// Both sides must hold.
    And,
    /// At least one side must hold.
    Or,
}

impl BinaryOperator {
    /// SQL keyword for this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        }
    }
}

/// A predicate on one property path.
///
/// The path may be dotted (`Customer.Country`) to filter on an associated
/// entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleCriterion {
    /// Property name or dotted association path.
    pub property: String,
    /// Comparison to apply.
    pub function: FilterFunction,
    /// Operand. `Value::List` for `In` / `NotIn`.
    pub value: Value,
    /// Explicitly marks a dotted-path criterion as safe to cache.
    pub cache_safe: bool,
}

impl SimpleCriterion {
    /// Create a new criterion.
    pub fn new(property: impl Into<String>, function: FilterFunction, value: impl Into<Value>) -> Self {
        Self {
            property: property.into(),
            function,
            value: value.into(),
            cache_safe: false,
        }
    }

    /// Mark this criterion as safe to cache even if it crosses associations.
    pub fn cache_safe(mut self) -> Self {
        self.cache_safe = true;
        self
    }

    /// Whether the property path crosses an association.
    pub fn is_nested(&self) -> bool {
        self.property.contains('.')
    }

    /// The property path split into its segments.
    pub fn parts(&self) -> Vec<&str> {
        self.property.split('.').collect()
    }
}

impl fmt::Display for SimpleCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.property, self.function, self.value)
    }
}

/// Two criteria joined by a boolean operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeCriterion {
    /// Left operand.
    pub left: Box<Criterion>,
    /// Operator.
    pub operator: BinaryOperator,
    /// Right operand.
    pub right: Box<Criterion>,
}

impl fmt::Display for CompositeCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.left, self.operator.as_str(), self.right)
    }
}

/// Backend SQL supplied by the caller.
///
/// `${{PropertyName}}` tokens in the text are replaced with the escaped column
/// reference of that property when the SQL is generated. Named parameters are
/// merged into the query's parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCriterion {
    /// SQL text with `${{PropertyName}}` placeholders.
    pub sql: String,
    /// Named parameters referenced by the SQL text.
    pub parameters: BTreeMap<String, Value>,
    /// The SQL's result cannot be captured by the cache key.
    pub cache_unsafe: bool,
}

const PLACEHOLDER_OPEN: &str = "${{";
const PLACEHOLDER_CLOSE: &str = "}}";

impl RawCriterion {
    /// Create a raw criterion from SQL text.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: BTreeMap::new(),
            cache_unsafe: false,
        }
    }

    /// Bind a named parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Mark this criterion as unsafe to cache (e.g. it depends on `GETDATE()`).
    pub fn cache_unsafe(mut self) -> Self {
        self.cache_unsafe = true;
        self
    }

    /// Whether results filtered by this criterion may be cached.
    pub fn is_cacheable(&self) -> bool {
        !self.cache_unsafe
    }

    /// Property names referenced through `${{Name}}` placeholders, in order.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.sql.as_str();
        while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
            let after = &rest[start + PLACEHOLDER_OPEN.len()..];
            match after.find(PLACEHOLDER_CLOSE) {
                Some(end) => {
                    names.push(after[..end].trim());
                    rest = &after[end + PLACEHOLDER_CLOSE.len()..];
                }
                None => break,
            }
        }
        names
    }

    /// Replace every placeholder using `resolve`, which maps a property name
    /// to its column reference.
    pub fn substitute<E, F>(&self, mut resolve: F) -> Result<String, E>
    where
        F: FnMut(&str) -> Result<String, E>,
    {
        let mut out = String::with_capacity(self.sql.len());
        let mut rest = self.sql.as_str();
        while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
            let after = &rest[start + PLACEHOLDER_OPEN.len()..];
            match after.find(PLACEHOLDER_CLOSE) {
                Some(end) => {
                    out.push_str(&rest[..start]);
                    out.push_str(&resolve(after[..end].trim())?);
                    rest = &after[end + PLACEHOLDER_CLOSE.len()..];
                }
                None => break,
            }
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl fmt::Display for RawCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.sql)?;
        for (name, value) in &self.parameters {
            write!(f, " @{name}={value}")?;
        }
        Ok(())
    }
}

/// A node in the filter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Criterion {
    /// Matches every row.
    Empty,
    /// Single predicate.
    Simple(SimpleCriterion),
    /// Two criteria joined by AND / OR.
    Composite(CompositeCriterion),
    /// Caller-supplied SQL.
    Raw(RawCriterion),
}

impl Criterion {
    /// Create a criterion with an explicit filter function.
    pub fn new(property: impl Into<String>, function: FilterFunction, value: impl Into<Value>) -> Self {
        Criterion::Simple(SimpleCriterion::new(property, function, value))
    }

    /// Property equals value.
    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterFunction::Is, value)
    }

    /// Property differs from value.
    pub fn ne(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterFunction::IsNot, value)
    }

    /// Property is null.
    pub fn is_null(property: impl Into<String>) -> Self {
        Self::new(property, FilterFunction::Is, Value::Null)
    }

    /// Property is not null.
    pub fn is_not_null(property: impl Into<String>) -> Self {
        Self::new(property, FilterFunction::IsNot, Value::Null)
    }

    /// String property contains the value.
    pub fn contains(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(property, FilterFunction::Contains, value.into())
    }

    /// String property does not contain the value.
    pub fn not_contains(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(property, FilterFunction::NotContains, value.into())
    }

    /// String property starts with the value.
    pub fn begins_with(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(property, FilterFunction::BeginsWith, value.into())
    }

    /// String property ends with the value.
    pub fn ends_with(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(property, FilterFunction::EndsWith, value.into())
    }

    /// Property is one of the values.
    pub fn in_values(property: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(property, FilterFunction::In, Value::List(values))
    }

    /// Property is none of the values.
    pub fn not_in_values(property: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(property, FilterFunction::NotIn, Value::List(values))
    }

    /// Property is smaller than the value.
    pub fn lt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterFunction::LessThan, value)
    }

    /// Property is smaller than or equal to the value.
    pub fn le(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterFunction::LessThanOrEqual, value)
    }

    /// Property is bigger than the value.
    pub fn gt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterFunction::MoreThan, value)
    }

    /// Property is bigger than or equal to the value.
    pub fn ge(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterFunction::MoreThanOrEqual, value)
    }

    /// Both criteria must hold.
    pub fn and(left: Criterion, right: Criterion) -> Self {
        Criterion::Composite(CompositeCriterion {
            left: Box::new(left),
            operator: BinaryOperator::And,
            right: Box::new(right),
        })
    }

    /// At least one criterion must hold.
    pub fn or(left: Criterion, right: Criterion) -> Self {
        Criterion::Composite(CompositeCriterion {
            left: Box::new(left),
            operator: BinaryOperator::Or,
            right: Box::new(right),
        })
    }

    /// Raw SQL criterion.
    pub fn raw(raw: RawCriterion) -> Self {
        Criterion::Raw(raw)
    }

    /// Mark a simple criterion as cache-safe. Other variants are unchanged.
    pub fn cache_safe(self) -> Self {
        match self {
            Criterion::Simple(simple) => Criterion::Simple(simple.cache_safe()),
            other => other,
        }
    }

    /// Whether results filtered by this criterion can be served from cache.
    ///
    /// Dotted paths are not cacheable unless explicitly marked safe, because
    /// a write to the associated entity would not invalidate lists of this
    /// one.
    pub fn is_cacheable(&self) -> bool {
        match self {
            Criterion::Empty => true,
            Criterion::Simple(simple) => !simple.is_nested() || simple.cache_safe,
            Criterion::Composite(composite) => {
                composite.left.is_cacheable() && composite.right.is_cacheable()
            }
            Criterion::Raw(raw) => raw.is_cacheable(),
        }
    }

    /// Whether any simple criterion in the tree filters on `property`.
    pub fn mentions_property(&self, property: &str) -> bool {
        match self {
            Criterion::Empty => false,
            Criterion::Simple(simple) => simple.property == property,
            Criterion::Composite(composite) => {
                composite.left.mentions_property(property)
                    || composite.right.mentions_property(property)
            }
            Criterion::Raw(raw) => raw.placeholders().contains(&property),
        }
    }

    /// Names of every parameter bound by raw criteria in the tree.
    pub fn raw_parameter_names(&self) -> Vec<&str> {
        match self {
            Criterion::Empty | Criterion::Simple(_) => Vec::new(),
            Criterion::Composite(composite) => {
                let mut names = composite.left.raw_parameter_names();
                names.extend(composite.right.raw_parameter_names());
                names
            }
            Criterion::Raw(raw) => raw.parameters.keys().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Empty => f.write_str("*"),
            Criterion::Simple(simple) => write!(f, "{simple}"),
            Criterion::Composite(composite) => write!(f, "{composite}"),
            Criterion::Raw(raw) => write!(f, "{raw}"),
        }
    }
}

impl From<SimpleCriterion> for Criterion {
    fn from(simple: SimpleCriterion) -> Self {
        Criterion::Simple(simple)
    }
}

impl From<RawCriterion> for Criterion {
    fn from(raw: RawCriterion) -> Self {
        Criterion::Raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_canonical_text() {
        let criterion = Criterion::or(
            Criterion::eq("FirstName", "Jo's"),
            Criterion::and(
                Criterion::gt("Age", 30i32),
                Criterion::in_values("Status", vec!["A".into(), "B".into()]),
            ),
        );

        assert_eq!(
            criterion.to_string(),
            "(FirstName Is 'Jo''s' OR (Age MoreThan 30 AND Status In ('A', 'B')))"
        );
    }

    #[test]
    fn test_nested_not_cacheable_unless_safe() {
        assert!(!Criterion::eq("Customer.Country", "UK").is_cacheable());
        assert!(Criterion::eq("Customer.Country", "UK").cache_safe().is_cacheable());
        assert!(Criterion::eq("Country", "UK").is_cacheable());
    }

    #[test]
    fn test_composite_cacheability_is_recursive() {
        let criterion = Criterion::and(
            Criterion::eq("Name", "x"),
            Criterion::or(Criterion::Empty, Criterion::eq("Customer.Name", "y")),
        );
        assert!(!criterion.is_cacheable());
    }

    #[test]
    fn test_raw_cache_unsafe() {
        let raw = RawCriterion::new("${{CreatedOn}} > GETDATE()").cache_unsafe();
        assert!(!Criterion::raw(raw).is_cacheable());
        assert!(Criterion::raw(RawCriterion::new("1 = 1")).is_cacheable());
    }

    #[test]
    fn test_raw_placeholders() {
        let raw = RawCriterion::new("${{FirstName}} + ' ' + ${{ LastName }} = @full")
            .with_parameter("full", "Jo Smith");
        assert_eq!(raw.placeholders(), vec!["FirstName", "LastName"]);

        let sql = raw
            .substitute::<(), _>(|name| Ok(format!("[{name}]")))
            .unwrap();
        assert_eq!(sql, "[FirstName] + ' ' + [LastName] = @full");
    }

    #[test]
    fn test_raw_unterminated_placeholder_left_alone() {
        let raw = RawCriterion::new("x = ${{Broken");
        assert!(raw.placeholders().is_empty());
        let sql = raw.substitute::<(), _>(|_| Ok(String::new())).unwrap();
        assert_eq!(sql, "x = ${{Broken");
    }

    #[test]
    fn test_mentions_property() {
        let criterion = Criterion::and(
            Criterion::eq("IsMarkedSoftDeleted", true),
            Criterion::eq("Name", "x"),
        );
        assert!(criterion.mentions_property("IsMarkedSoftDeleted"));
        assert!(!criterion.mentions_property("Age"));
    }

    #[test]
    fn test_raw_parameter_names() {
        let criterion = Criterion::or(
            Criterion::eq("Age", 3i32),
            Criterion::raw(
                RawCriterion::new("@Since < @Until")
                    .with_parameter("Until", 2i64)
                    .with_parameter("Since", 1i64),
            ),
        );
        assert_eq!(criterion.raw_parameter_names(), vec!["Since", "Until"]);
        assert!(Criterion::eq("Age", 3i32).raw_parameter_names().is_empty());
    }

    #[test]
    fn test_parts() {
        let simple = SimpleCriterion::new("Order.Customer.Country", FilterFunction::Is, "UK");
        assert!(simple.is_nested());
        assert_eq!(simple.parts(), vec!["Order", "Customer", "Country"]);
    }
}
