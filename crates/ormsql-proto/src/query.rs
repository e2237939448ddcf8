//! Query shape: criteria, sort, row limit, paging and includes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::criteria::Criterion;
use crate::error::Error;

/// A load request against one entity type.
///
/// Top-level criteria are implicitly ANDed. A query is built per call and is
/// not modified once handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Entity type name as registered in the catalog.
    pub entity: String,
    /// Criteria, ANDed together in declared order.
    pub criteria: Vec<Criterion>,
    /// Ordering specification.
    pub order_by: Vec<OrderSpec>,
    /// Maximum number of rows to return.
    pub take: Option<u32>,
    /// Page window. Requires `order_by`.
    pub paging: Option<Paging>,
    /// Associations to eager-load (dot-notation for nested associations).
    pub includes: Vec<Include>,
}

impl Query {
    /// Create a new query for an entity type.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            criteria: vec![],
            order_by: vec![],
            take: None,
            paging: None,
            includes: vec![],
        }
    }

    /// Add a criterion.
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Add several criteria.
    pub fn with_criteria(mut self, criteria: impl IntoIterator<Item = Criterion>) -> Self {
        self.criteria.extend(criteria);
        self
    }

    /// Add ordering for this query.
    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order_by.push(order);
        self
    }

    /// Limit the number of rows.
    pub fn take(mut self, take: u32) -> Self {
        self.take = Some(take);
        self
    }

    /// Request one page of results.
    pub fn with_paging(mut self, start_index: u32, page_size: u32) -> Self {
        self.paging = Some(Paging::new(start_index, page_size));
        self
    }

    /// Eager-load an association path.
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.includes.push(Include::new(path));
        self
    }

    /// Whether a page window was requested.
    pub fn is_paged(&self) -> bool {
        self.paging.is_some()
    }

    /// Copy of this query targeting another entity type.
    ///
    /// Used to fan a query on an abstract type out to its implementations.
    pub fn for_entity(&self, entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            ..self.clone()
        }
    }

    /// Check the structural invariants of the query.
    ///
    /// Paging requires an explicit order because relational engines do not
    /// guarantee row order otherwise.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(paging) = &self.paging {
            if self.order_by.is_empty() {
                return Err(Error::PagingWithoutOrder {
                    entity: self.entity.clone(),
                });
            }
            if paging.page_size == 0 {
                return Err(Error::EmptyPage {
                    entity: self.entity.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Order specification for sorting results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Property to order by.
    pub property: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create an ascending order spec.
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order spec.
    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: OrderDirection::Desc,
        }
    }
}

impl fmt::Display for OrderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            OrderDirection::Asc => write!(f, "{}", self.property),
            OrderDirection::Desc => write!(f, "{} DESC", self.property),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Page window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    /// Number of rows to skip.
    pub start_index: u32,
    /// Number of rows in the page.
    pub page_size: u32,
}

impl Paging {
    /// Create a page window.
    pub fn new(start_index: u32, page_size: u32) -> Self {
        Self {
            start_index,
            page_size,
        }
    }
}

/// An association to eager-load alongside the main rows.
///
/// The `path` uses dot-notation for nested associations:
/// - "Customer" - load the customer of each order
/// - "Customer.Address" - then load the address of each customer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Include {
    /// Dot-separated association path.
    pub path: String,
}

impl Include {
    /// Create a new include for an association path.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// The first association on the path.
    pub fn head(&self) -> &str {
        self.path.split('.').next().unwrap_or(&self.path)
    }

    /// The remainder of the path after the first association.
    pub fn tail(&self) -> Option<&str> {
        self.path.split_once('.').map(|(_, rest)| rest)
    }

    /// Check if this is a top-level include (no dots in path).
    pub fn is_top_level(&self) -> bool {
        !self.path.contains('.')
    }

    /// Get the depth of this include (number of dots + 1).
    pub fn depth(&self) -> usize {
        self.path.matches('.').count() + 1
    }
}
