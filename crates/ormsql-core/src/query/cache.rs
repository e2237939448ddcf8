//! List-cache policy, key derivation and statistics.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use ormsql_proto::{Criterion, Query};

use crate::catalog::EntityDef;

/// Whether the result list of `query` may be served from and stored in cache.
///
/// Paged queries and abstract types are never cached. Otherwise every
/// criterion must be cacheable: dotted paths only when marked cache-safe, raw
/// SQL unless marked cache-unsafe.
pub fn is_cacheable(query: &Query, entity: &EntityDef) -> bool {
    !query.is_paged() && !entity.is_abstract() && query.criteria.iter().all(Criterion::is_cacheable)
}

/// Cache key for the result list of `query`.
///
/// Built from the qualified type name and the canonical text of each
/// criterion in declared order, followed by the row limit and sort. Two
/// queries with the same criteria in a different order get different keys.
pub fn cache_key(query: &Query, entity: &EntityDef) -> String {
    let mut key = entity.qualified_name();
    for criterion in &query.criteria {
        key.push('|');
        key.push_str(&criterion.to_string());
    }
    if let Some(take) = query.take {
        key.push_str(&format!("|Top:{take}"));
    }
    if !query.order_by.is_empty() {
        let order: Vec<String> = query.order_by.iter().map(ToString::to_string).collect();
        key.push_str(&format!("|OrderBy:{}", order.join(",")));
    }
    key
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheStats {
    /// Get hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(AtomicOrdering::Relaxed)
    }

    /// Get miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(AtomicOrdering::Relaxed)
    }

    /// Number of cached lists dropped by invalidation.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(AtomicOrdering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, AtomicOrdering::Relaxed);
    }
}
