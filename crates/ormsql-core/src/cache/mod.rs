//! Entity and list caching.
//!
//! [`CacheProvider`] is the backend contract; [`MemoryCacheProvider`] is the
//! in-process implementation. Distributed backends live in their own crates.

pub mod key;
mod memory;
mod provider;

pub use key::{current_timestamp, entity_key, list_key, list_prefix};
pub use memory::MemoryCacheProvider;
pub use provider::{CacheError, CacheProvider};
