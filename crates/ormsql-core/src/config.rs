//! Engine configuration.
//!
//! Settings can be built in code or read from flat `Section:Key` pairs:
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `ConnectionStrings:<name>` | Connection string for database `<name>` |
//! | `Database:DefaultConnection` | Database used when no scope is entered |
//! | `Database:Cache:Provider` | `InProcess` (default) or `Redis` |
//! | `Database:Cache:RedisConnection` | Redis URL, required for `Redis` |
//! | `Database:Encryption:Key` | Base64 AES-256 key for encrypted properties |

use std::collections::BTreeMap;

use crate::context::DbContext;
use crate::encryption::AesGcmCipher;
use crate::error::Error;

/// Database used when nothing else is configured.
pub const DEFAULT_CONNECTION: &str = "AppDatabase";

const CONNECTION_STRINGS: &str = "ConnectionStrings:";
const DEFAULT_CONNECTION_KEY: &str = "Database:DefaultConnection";
const CACHE_PROVIDER_KEY: &str = "Database:Cache:Provider";
const REDIS_CONNECTION_KEY: &str = "Database:Cache:RedisConnection";
const ENCRYPTION_KEY: &str = "Database:Encryption:Key";

/// Which cache backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    /// Process-local memory.
    #[default]
    InProcess,
    /// Shared Redis server.
    Redis,
}

impl CacheBackend {
    fn parse(value: &str) -> Result<Self, Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inprocess" | "memory" => Ok(CacheBackend::InProcess),
            "redis" => Ok(CacheBackend::Redis),
            other => Err(Error::Configuration(format!(
                "unknown cache provider `{other}`"
            ))),
        }
    }
}

/// Cache backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Backend kind.
    pub backend: CacheBackend,
    /// Redis URL when `backend` is `Redis`.
    pub redis_connection: Option<String>,
}

impl CacheConfig {
    /// Process-local cache.
    pub fn in_process() -> Self {
        Self::default()
    }

    /// Redis cache at `url`.
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            backend: CacheBackend::Redis,
            redis_connection: Some(url.into()),
        }
    }
}

/// Configuration for the query engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Connection strings by database name.
    pub connection_strings: BTreeMap<String, String>,
    /// Database used outside any entered scope.
    pub default_connection: String,
    /// Cache backend.
    pub cache: CacheConfig,
    /// Base64 encryption key.
    pub encryption_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connection_strings: BTreeMap::new(),
            default_connection: DEFAULT_CONNECTION.to_string(),
            cache: CacheConfig::default(),
            encryption_key: None,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from `Section:Key` pairs. Unknown keys are ignored.
    pub fn from_settings<I, K, V>(settings: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();
        for (key, value) in settings {
            let key = key.as_ref();
            let value = value.into();
            if let Some(name) = key.strip_prefix(CONNECTION_STRINGS) {
                config.connection_strings.insert(name.to_string(), value);
            } else if key == DEFAULT_CONNECTION_KEY {
                config.default_connection = value;
            } else if key == CACHE_PROVIDER_KEY {
                config.cache.backend = CacheBackend::parse(&value)?;
            } else if key == REDIS_CONNECTION_KEY {
                config.cache.redis_connection = Some(value);
            } else if key == ENCRYPTION_KEY {
                config.encryption_key = Some(value);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Add a connection string.
    pub fn with_connection_string(
        mut self,
        name: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Self {
        self.connection_strings
            .insert(name.into(), connection_string.into());
        self
    }

    /// Set the default database.
    pub fn with_default_connection(mut self, name: impl Into<String>) -> Self {
        self.default_connection = name.into();
        self
    }

    /// Set the cache backend.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the encryption key.
    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), Error> {
        if self.cache.backend == CacheBackend::Redis && self.cache.redis_connection.is_none() {
            return Err(Error::Configuration(format!(
                "`{REDIS_CONNECTION_KEY}` is required for the Redis cache"
            )));
        }
        Ok(())
    }

    /// Connection string for a database.
    pub fn connection_string(&self, name: &str) -> Option<&str> {
        self.connection_strings.get(name).map(String::as_str)
    }

    /// Context for a named database with its connection string resolved.
    pub fn context_for(&self, name: &str) -> DbContext {
        let context = DbContext::new(name);
        match self.connection_string(name) {
            Some(cs) => context.with_connection_string(cs),
            None => context,
        }
    }

    /// Context for the default database.
    pub fn default_context(&self) -> DbContext {
        self.context_for(&self.default_connection)
    }

    /// Cipher for the configured key, if any.
    pub fn cipher(&self) -> Result<Option<AesGcmCipher>, Error> {
        self.encryption_key
            .as_deref()
            .map(AesGcmCipher::from_base64_key)
            .transpose()
    }
}
