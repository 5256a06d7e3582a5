//! Redis cache backend
//!
//! Reads and writes share one `ConnectionManager`; every watch opens its own
//! pub/sub connection subscribed to the key's keyspace notification channel.

use std::fmt;
use std::pin::pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{ConnectionManager, PubSub};
use redis::{AsyncCommands, Client};
use tracing::{debug, info, trace, warn};

use crate::domain::DomainError;
use crate::domain::cache::{
    CacheStore, Expiry, MutationEvent, MutationKind, MutationNotifier, MutationSubscription,
    StorageKey,
};

/// Keyspace events needed by watchers: keyspace channel, string writes,
/// generic commands, expirations and evictions
pub const DEFAULT_KEYSPACE_EVENTS: &str = "K$gxe";

/// Configuration for Redis cache
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// Connection timeout, applied to the shared connection and to every watch
    pub connection_timeout: Duration,
    /// Flags for `CONFIG SET notify-keyspace-events`; `None` leaves the server as is
    pub keyspace_events: Option<String>,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connection_timeout: Duration::from_secs(5),
            keyspace_events: Some(DEFAULT_KEYSPACE_EVENTS.to_string()),
        }
    }
}

impl RedisCacheConfig {
    /// Creates a new configuration with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the keyspace notification flags applied on connect
    pub fn with_keyspace_events(mut self, flags: impl Into<String>) -> Self {
        self.keyspace_events = Some(flags.into());
        self
    }

    /// Leaves the server's keyspace notification settings untouched
    pub fn without_keyspace_config(mut self) -> Self {
        self.keyspace_events = None;
        self
    }
}

/// Channel carrying keyspace notifications for `key` in database `db`
fn keyspace_channel(db: i64, key: &StorageKey) -> String {
    format!("__keyspace@{}__:{}", db, key)
}

/// Redis cache implementation
///
/// Features:
/// - TTL support per entry (`SET EX`)
/// - Atomic set-if-absent (`SET NX`)
/// - Per-key change notification via keyspace events
#[derive(Clone)]
pub struct RedisCache {
    client: Client,
    connection: ConnectionManager,
    db: i64,
    config: RedisCacheConfig,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("config", &self.config)
            .field("db", &self.db)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisCache {
    /// Creates a new Redis cache connection
    pub async fn new(config: RedisCacheConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            DomainError::configuration(format!("Failed to create Redis client: {}", e))
        })?;

        let connection =
            tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client.clone()))
                .await
                .map_err(|_| {
                    DomainError::store_unavailable(format!(
                        "Timed out connecting to Redis after {:?}",
                        config.connection_timeout
                    ))
                })?
                .map_err(|e| {
                    DomainError::store_unavailable(format!("Failed to connect to Redis: {}", e))
                })?;

        let db = client.get_connection_info().redis.db;

        let cache = Self {
            client,
            connection,
            db,
            config,
        };

        if let Some(flags) = cache.config.keyspace_events.as_deref() {
            cache.configure_keyspace_events(flags).await;
        }

        info!(db, "Connected to Redis");
        Ok(cache)
    }

    /// Creates a Redis cache with default configuration
    pub async fn with_url(url: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(RedisCacheConfig::new(url)).await
    }

    /// Enables keyspace notifications; managed deployments often reject
    /// `CONFIG`, in which case they must be enabled server-side.
    async fn configure_keyspace_events(&self, flags: &str) {
        let mut conn = self.connection.clone();

        let result = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg(flags)
            .query_async::<()>(&mut conn)
            .await;

        match result {
            Ok(()) => debug!(flags, "Enabled Redis keyspace notifications"),
            Err(e) => warn!(
                flags,
                error = %e,
                "Could not enable keyspace notifications; watchers will rely on timeouts"
            ),
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn exists(&self, key: &StorageKey) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();

        let exists: bool = conn.exists(key.as_str()).await.map_err(|e| {
            DomainError::store_unavailable(format!(
                "Failed to check existence of key '{}': {}",
                key, e
            ))
        })?;

        Ok(exists)
    }

    async fn get(&self, key: &StorageKey) -> Result<Option<String>, DomainError> {
        let mut conn = self.connection.clone();

        let result: Option<String> = conn.get(key.as_str()).await.map_err(|e| {
            DomainError::store_unavailable(format!("Failed to get key '{}': {}", key, e))
        })?;

        Ok(result)
    }

    async fn set(
        &self,
        key: &StorageKey,
        value: &str,
        ttl: Option<Expiry>,
    ) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();

        let result: redis::RedisResult<()> = match ttl {
            Some(ttl) => conn.set_ex(key.as_str(), value, ttl.as_secs()).await,
            None => conn.set(key.as_str(), value).await,
        };

        result.map_err(|e| {
            DomainError::store_unavailable(format!("Failed to set key '{}': {}", key, e))
        })?;

        Ok(true)
    }

    async fn set_if_absent(
        &self,
        key: &StorageKey,
        value: &str,
        ttl: Option<Expiry>,
    ) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();

        let mut cmd = redis::cmd("SET");
        cmd.arg(key.as_str()).arg(value).arg("NX");

        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs());
        }

        // Redis returns "OK" if set, nil if the key existed
        let result: Option<String> = cmd.query_async(&mut conn).await.map_err(|e| {
            DomainError::store_unavailable(format!(
                "Failed to set_if_absent key '{}': {}",
                key, e
            ))
        })?;

        Ok(result.is_some())
    }

    async fn remove(&self, key: &StorageKey) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();

        let deleted: i64 = conn.del(key.as_str()).await.map_err(|e| {
            DomainError::store_unavailable(format!("Failed to delete key '{}': {}", key, e))
        })?;

        Ok(deleted > 0)
    }

    async fn ping(&self) -> Result<(), DomainError> {
        let mut conn = self.connection.clone();

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::store_unavailable(format!("Failed to ping Redis: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl MutationNotifier for RedisCache {
    async fn watch(
        &self,
        key: &StorageKey,
    ) -> Result<Box<dyn MutationSubscription>, DomainError> {
        let mut pubsub =
            tokio::time::timeout(self.config.connection_timeout, self.client.get_async_pubsub())
                .await
                .map_err(|_| DomainError::subscription("timed out opening pub/sub connection"))?
                .map_err(|e| {
                    DomainError::subscription(format!("failed to open pub/sub connection: {}", e))
                })?;

        let channel = keyspace_channel(self.db, key);

        pubsub.subscribe(&channel).await.map_err(|e| {
            DomainError::subscription(format!("failed to subscribe to '{}': {}", channel, e))
        })?;

        trace!(channel = %channel, "Subscribed to keyspace channel");

        Ok(Box::new(RedisSubscription {
            channel,
            pubsub: Some(pubsub),
        }))
    }
}

/// Dedicated pub/sub connection listening to one keyspace channel
pub struct RedisSubscription {
    channel: String,
    pubsub: Option<PubSub>,
}

impl fmt::Debug for RedisSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisSubscription")
            .field("channel", &self.channel)
            .field("open", &self.pubsub.is_some())
            .finish()
    }
}

#[async_trait]
impl MutationSubscription for RedisSubscription {
    async fn next_event(&mut self) -> Result<Option<MutationEvent>, DomainError> {
        let Some(pubsub) = self.pubsub.as_mut() else {
            return Err(DomainError::subscription("subscription already closed"));
        };

        let mut messages = pin!(pubsub.on_message());

        while let Some(msg) = messages.next().await {
            let event: String = msg.get_payload().map_err(|e| {
                DomainError::subscription(format!(
                    "malformed notification on '{}': {}",
                    self.channel, e
                ))
            })?;

            match MutationKind::from_keyspace_event(&event) {
                Some(kind) => return Ok(Some(MutationEvent::new(kind))),
                None => trace!(channel = %self.channel, event = %event, "Ignoring keyspace event"),
            }
        }

        Ok(None)
    }

    async fn close(&mut self) -> Result<(), DomainError> {
        if let Some(mut pubsub) = self.pubsub.take() {
            pubsub.unsubscribe(&self.channel).await.map_err(|e| {
                DomainError::subscription(format!(
                    "failed to unsubscribe from '{}': {}",
                    self.channel, e
                ))
            })?;
        }

        Ok(())
    }
}
