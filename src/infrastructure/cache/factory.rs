//! Cache factory for runtime selection

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::domain::DomainError;
use crate::domain::cache::{CacheStore, MutationNotifier};

use super::in_memory::{InMemoryCache, InMemoryCacheConfig};
use super::redis::{DEFAULT_KEYSPACE_EVENTS, RedisCache, RedisCacheConfig};

/// Supported cache types
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum CacheType {
    /// In-memory cache using moka
    #[default]
    InMemory,
    /// Redis cache
    Redis,
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheType::InMemory => write!(f, "in_memory"),
            CacheType::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for CacheType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(CacheType::InMemory),
            "redis" => Ok(CacheType::Redis),
            _ => Err(DomainError::configuration(format!(
                "Unknown cache type: {}. Valid types: in_memory, redis",
                s
            ))),
        }
    }
}

impl TryFrom<String> for CacheType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Cache section of the application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Type of cache to create
    pub backend: CacheType,
    /// Redis URL (required for Redis type)
    pub redis_url: Option<String>,
    /// Connection timeout in seconds (Redis only)
    pub connection_timeout_secs: u64,
    /// Issue `CONFIG SET notify-keyspace-events` on connect (Redis only)
    pub configure_keyspace_events: bool,
    /// Keyspace notification flags (Redis only)
    pub keyspace_events: String,
    /// Maximum capacity (in-memory only)
    pub max_capacity: u64,
    /// Mutation channel capacity (in-memory only)
    pub notification_capacity: usize,
    /// Worker threads driving blocking calls
    pub blocking_workers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheType::InMemory,
            redis_url: None,
            connection_timeout_secs: 5,
            configure_keyspace_events: true,
            keyspace_events: DEFAULT_KEYSPACE_EVENTS.to_string(),
            max_capacity: 10_000,
            notification_capacity: 1024,
            blocking_workers: 2,
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration for in-memory cache
    pub fn in_memory() -> Self {
        Self {
            backend: CacheType::InMemory,
            ..Default::default()
        }
    }

    /// Creates a new configuration for Redis cache
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            backend: CacheType::Redis,
            redis_url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Sets the maximum capacity (in-memory only)
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Sets the number of blocking workers
    pub fn with_blocking_workers(mut self, workers: usize) -> Self {
        self.blocking_workers = workers;
        self
    }

    /// Leaves the Redis keyspace notification settings untouched
    pub fn without_keyspace_config(mut self) -> Self {
        self.configure_keyspace_events = false;
        self
    }

    fn redis_config(&self) -> Result<RedisCacheConfig, DomainError> {
        let url = self.redis_url.clone().ok_or_else(|| {
            DomainError::configuration("Redis URL is required for Redis cache type")
        })?;

        let config = RedisCacheConfig::new(url)
            .with_connection_timeout(Duration::from_secs(self.connection_timeout_secs.max(1)));

        Ok(if self.configure_keyspace_events {
            config.with_keyspace_events(self.keyspace_events.clone())
        } else {
            config.without_keyspace_config()
        })
    }

    fn in_memory_config(&self) -> InMemoryCacheConfig {
        InMemoryCacheConfig::default()
            .with_max_capacity(self.max_capacity)
            .with_notification_capacity(self.notification_capacity)
    }
}

/// Store and notifier halves of one backend
#[derive(Debug, Clone)]
pub struct CacheBackend {
    pub store: Arc<dyn CacheStore>,
    pub notifier: Arc<dyn MutationNotifier>,
}

impl CacheBackend {
    /// Uses a single object as both store and notifier
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: CacheStore + MutationNotifier + 'static,
    {
        Self {
            store: backend.clone(),
            notifier: backend,
        }
    }
}

/// Factory for creating cache backends
#[derive(Debug, Default)]
pub struct CacheFactory;

impl CacheFactory {
    /// Creates a new cache factory
    pub fn new() -> Self {
        Self
    }

    /// Creates a backend based on configuration and checks it is reachable
    pub async fn create(&self, config: &CacheConfig) -> Result<CacheBackend, DomainError> {
        let backend = match config.backend {
            CacheType::InMemory => self.create_in_memory_with_config(config.in_memory_config()),
            CacheType::Redis => self.create_redis_with_config(config.redis_config()?).await?,
        };

        backend.store.ping().await?;
        info!(backend = %config.backend, "Cache backend ready");

        Ok(backend)
    }

    /// Creates an in-memory backend with default settings
    pub fn create_in_memory(&self) -> CacheBackend {
        CacheBackend::from_shared(Arc::new(InMemoryCache::new()))
    }

    /// Creates an in-memory backend with custom configuration
    pub fn create_in_memory_with_config(&self, config: InMemoryCacheConfig) -> CacheBackend {
        CacheBackend::from_shared(Arc::new(InMemoryCache::with_config(config)))
    }

    /// Creates a Redis backend with custom configuration
    pub async fn create_redis_with_config(
        &self,
        config: RedisCacheConfig,
    ) -> Result<CacheBackend, DomainError> {
        let cache = RedisCache::new(config).await?;
        Ok(CacheBackend::from_shared(Arc::new(cache)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::StorageKey;

    #[test]
    fn test_cache_type_from_str() {
        assert_eq!("in_memory".parse::<CacheType>().unwrap(), CacheType::InMemory);
        assert_eq!("inmemory".parse::<CacheType>().unwrap(), CacheType::InMemory);
        assert_eq!("memory".parse::<CacheType>().unwrap(), CacheType::InMemory);
        assert_eq!("redis".parse::<CacheType>().unwrap(), CacheType::Redis);
        assert_eq!("REDIS".parse::<CacheType>().unwrap(), CacheType::Redis);
    }

    #[test]
    fn test_cache_type_from_str_invalid() {
        let result = "memcached".parse::<CacheType>();
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[test]
    fn test_cache_type_display() {
        assert_eq!(CacheType::InMemory.to_string(), "in_memory");
        assert_eq!(CacheType::Redis.to_string(), "redis");
    }

    #[test]
    fn test_cache_config_deserializes_with_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"backend":"redis","redis_url":"redis://cache:6379"}"#)
                .unwrap();

        assert_eq!(config.backend, CacheType::Redis);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.blocking_workers, 2);
        assert!(config.configure_keyspace_events);
    }

    #[test]
    fn test_cache_config_rejects_unknown_backend() {
        let result = serde_json::from_str::<CacheConfig>(r#"{"backend":"memcached"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_redis_config_mapping() {
        let config = CacheConfig::redis("redis://localhost:6379").without_keyspace_config();
        let redis = config.redis_config().unwrap();

        assert_eq!(redis.url, "redis://localhost:6379");
        assert_eq!(redis.connection_timeout, Duration::from_secs(5));
        assert!(redis.keyspace_events.is_none());
    }

    #[tokio::test]
    async fn test_factory_create_in_memory() {
        let factory = CacheFactory::new();
        let backend = factory.create(&CacheConfig::in_memory()).await.unwrap();

        let key = StorageKey::resolve(None, "test");
        backend.store.set(&key, "value", None).await.unwrap();

        assert_eq!(
            backend.store.get(&key).await.unwrap(),
            Some("value".to_string())
        );
    }

    #[tokio::test]
    async fn test_factory_in_memory_halves_share_state() {
        let backend = CacheFactory::new().create_in_memory();
        let key = StorageKey::resolve(None, "shared");

        let mut subscription = backend.notifier.watch(&key).await.unwrap();
        backend.store.set(&key, "v", None).await.unwrap();

        let event = subscription.next_event().await.unwrap();
        assert!(event.is_some());
    }

    #[tokio::test]
    async fn test_factory_create_redis_missing_url() {
        let factory = CacheFactory::new();
        let config = CacheConfig {
            backend: CacheType::Redis,
            redis_url: None,
            ..Default::default()
        };

        let result = factory.create(&config).await;
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }
}
