//! Query execution: cache decisions, provider fan-out, identity map and
//! eager loading.

mod cache;
mod executor;
mod identity;
mod include;

pub use cache::{cache_key, is_cacheable, CacheStats};
pub use executor::{Database, DatabaseBuilder, LoadedHook};
pub use identity::{EntityKey, IdentityMap, Resident};
