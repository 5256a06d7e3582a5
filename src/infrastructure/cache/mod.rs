//! Cache infrastructure - Cache backends

mod factory;
mod in_memory;
mod redis;

pub use factory::{CacheBackend, CacheConfig, CacheFactory, CacheType};
pub use in_memory::{InMemoryCache, InMemoryCacheConfig, InMemorySubscription};
pub use redis::{DEFAULT_KEYSPACE_EVENTS, RedisCache, RedisCacheConfig, RedisSubscription};
