//! Redis connection settings.

use ormsql_core::config::{CacheBackend, CacheConfig};
use ormsql_core::Error;

/// Prefix put in front of every key.
pub const DEFAULT_KEY_PREFIX: &str = "ormsql:";

/// Keys requested per SCAN round trip during invalidation.
pub const DEFAULT_SCAN_COUNT: usize = 500;

/// Configuration for [`RedisCacheProvider`](crate::RedisCacheProvider).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`.
    pub url: String,
    /// Prefix for every key written by this provider.
    pub key_prefix: String,
    /// SCAN batch size.
    pub scan_count: usize,
}

impl RedisConfig {
    /// Settings for `url` with default prefix and batch size.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    /// Use a different key prefix (e.g. one per application).
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the SCAN batch size.
    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count.max(1);
        self
    }

    /// Settings from the engine's cache section.
    ///
    /// Fails unless the backend is Redis and a connection URL is set.
    pub fn from_cache_config(cache: &CacheConfig) -> Result<Self, Error> {
        if cache.backend != CacheBackend::Redis {
            return Err(Error::Configuration(
                "cache backend is not Redis".to_string(),
            ));
        }
        match cache.redis_connection.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(Self::new(url)),
            _ => Err(Error::Configuration(
                "Database:Cache:RedisConnection is required for the Redis cache".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cache_config() {
        let config = RedisConfig::from_cache_config(&CacheConfig::redis("redis://cache:6379")).unwrap();
        assert_eq!(config.url, "redis://cache:6379");
        assert_eq!(config.key_prefix, DEFAULT_KEY_PREFIX);
        assert_eq!(config.scan_count, DEFAULT_SCAN_COUNT);
    }

    #[test]
    fn test_requires_redis_backend_and_url() {
        assert!(RedisConfig::from_cache_config(&CacheConfig::in_process()).is_err());

        let missing = CacheConfig {
            backend: CacheBackend::Redis,
            redis_connection: Some("  ".to_string()),
        };
        assert!(matches!(
            RedisConfig::from_cache_config(&missing),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = RedisConfig::new("redis://localhost")
            .with_key_prefix("shop:")
            .with_scan_count(0);
        assert_eq!(config.key_prefix, "shop:");
        assert_eq!(config.scan_count, 1);
    }
}
