//! Named query parameters.

use ormsql_proto::Value;

use super::dialect::SqlDialect;
use crate::error::Error;

/// One bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParameter {
    /// Name without the dialect prefix.
    pub name: String,
    /// Bound value.
    pub value: Value,
    /// Native type name for the backend.
    pub sql_type: &'static str,
}

/// Parameter set of one generated statement.
///
/// Names are unique within the set. A name already taken gets `_2`, `_3`, ...
/// appended, so two criteria on the same property never collide. Names that
/// raw SQL will bind later can be reserved so generated names avoid them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    items: Vec<SqlParameter>,
    reserved: Vec<String>,
}

impl Parameters {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value under a name derived from `base` and return the final name.
    pub fn add(&mut self, dialect: &dyn SqlDialect, base: &str, value: Value) -> String {
        let name = self.unique_name(&sanitize(base));
        self.items.push(SqlParameter {
            name: name.clone(),
            sql_type: dialect.parameter_type(&value),
            value,
        });
        name
    }

    /// Add a parameter built by `make` under a name derived from `base`.
    ///
    /// `make` receives the final name; the name it sets is ignored.
    pub fn add_with<F>(&mut self, base: &str, make: F) -> Result<String, Error>
    where
        F: FnOnce(&str) -> Result<SqlParameter, Error>,
    {
        let name = self.unique_name(&sanitize(base));
        let mut parameter = make(&name)?;
        parameter.name = name.clone();
        self.items.push(parameter);
        Ok(name)
    }

    /// Keep `name` free for a later [`bind`](Self::bind).
    pub fn reserve(&mut self, name: &str) {
        if !self.reserved.iter().any(|r| r == name) {
            self.reserved.push(name.to_string());
        }
    }

    /// Add a parameter under an exact name.
    ///
    /// Binding the same name twice is allowed only for the same value.
    pub fn bind(&mut self, dialect: &dyn SqlDialect, name: &str, value: Value) -> Result<(), Error> {
        if let Some(existing) = self.get(name) {
            if existing.value == value {
                return Ok(());
            }
            return Err(Error::Usage(format!(
                "parameter `{name}` is bound to two different values"
            )));
        }
        self.items.push(SqlParameter {
            name: name.to_string(),
            sql_type: dialect.parameter_type(&value),
            value,
        });
        Ok(())
    }

    /// Get a parameter by name.
    pub fn get(&self, name: &str) -> Option<&SqlParameter> {
        self.items.iter().find(|p| p.name == name)
    }

    /// Iterate parameters in binding order.
    pub fn iter(&self) -> impl Iterator<Item = &SqlParameter> {
        self.items.iter()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no parameters are bound.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn is_taken(&self, name: &str) -> bool {
        self.get(name).is_some() || self.reserved.iter().any(|r| r == name)
    }

    fn unique_name(&self, base: &str) -> String {
        if !self.is_taken(base) {
            return base.to_string();
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{base}_{suffix}");
            if !self.is_taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a SqlParameter;
    type IntoIter = std::slice::Iter<'a, SqlParameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Keep only characters valid in a parameter name.
fn sanitize(base: &str) -> String {
    let name: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "p".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlServerDialect;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unique_names() {
        let mut params = Parameters::new();
        let d = SqlServerDialect;

        assert_eq!(params.add(&d, "Age", 1i32.into()), "Age");
        assert_eq!(params.add(&d, "Age", 2i32.into()), "Age_2");
        assert_eq!(params.add(&d, "Age", 3i32.into()), "Age_3");
        assert_eq!(params.len(), 3);
        assert_eq!(params.get("Age_2").unwrap().value, Value::Int32(2));
        assert_eq!(params.get("Age").unwrap().sql_type, "int");
    }

    #[test]
    fn test_sanitized_names() {
        let mut params = Parameters::new();
        assert_eq!(
            params.add(&SqlServerDialect, "Customer.Name", "x".into()),
            "Customer_Name"
        );
        assert_eq!(params.add(&SqlServerDialect, "", "y".into()), "p");
    }

    #[test]
    fn test_bind_exact_name() {
        let mut params = Parameters::new();
        let d = SqlServerDialect;

        params.bind(&d, "Since", Value::Timestamp(5)).unwrap();
        params.bind(&d, "Since", Value::Timestamp(5)).unwrap();
        assert_eq!(params.len(), 1);
        assert!(matches!(
            params.bind(&d, "Since", Value::Timestamp(6)),
            Err(Error::Usage(_))
        ));
        assert_eq!(params.add(&d, "Since", 1i32.into()), "Since_2");
    }

    #[test]
    fn test_add_with_builder() {
        let mut params = Parameters::new();
        params.add(&SqlServerDialect, "City", "Oslo".into());
        let name = params
            .add_with("City", |name| {
                Ok(SqlParameter {
                    name: format!("ignored_{name}"),
                    value: "Bergen".into(),
                    sql_type: "citext",
                })
            })
            .unwrap();

        assert_eq!(name, "City_2");
        assert_eq!(params.get("City_2").unwrap().sql_type, "citext");
    }

    #[test]
    fn test_reserved_names_are_skipped() {
        let mut params = Parameters::new();
        let d = SqlServerDialect;

        params.reserve("Age");
        assert_eq!(params.add(&d, "Age", 5i32.into()), "Age_2");
        params.bind(&d, "Age", 10i32.into()).unwrap();
        assert_eq!(params.get("Age").unwrap().value, Value::Int32(10));
        assert_eq!(params.len(), 2);
    }
}
