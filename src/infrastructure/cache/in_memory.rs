//! In-memory cache backend using moka
//!
//! Single-process stand-in for the shared store: mutation notifications travel
//! over a broadcast channel, so only watchers in the same process see them.
//!
//! TTLs are enforced on read and by one timer task per expiring write, which
//! removes the entry at its deadline and publishes the removal.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::notification::RemovalCause;
use moka::ops::compute::{CompResult, Op};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

use crate::domain::DomainError;
use crate::domain::cache::{
    CacheStore, Expiry, MutationEvent, MutationKind, MutationNotifier, MutationSubscription,
    StorageKey,
};

/// Configuration for in-memory cache
#[derive(Debug, Clone)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries
    pub max_capacity: u64,
    /// Buffered mutation events before slow watchers start lagging
    pub notification_capacity: usize,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            notification_capacity: 1024,
        }
    }
}

impl InMemoryCacheConfig {
    /// Sets the maximum capacity
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Sets the notification channel capacity
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity.max(1);
        self
    }
}

/// Cache entry stored in moka
#[derive(Debug, Clone)]
struct CacheEntry {
    data: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(data: &str, ttl: Option<Expiry>) -> Self {
        Self {
            data: data.to_string(),
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl.as_duration())),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }
}

#[derive(Debug, Clone)]
struct KeyMutation {
    key: String,
    kind: MutationKind,
}

/// Thread-safe in-memory cache implementing both the store and the notifier
#[derive(Debug)]
pub struct InMemoryCache {
    cache: MokaCache<String, CacheEntry>,
    mutations: broadcast::Sender<KeyMutation>,
    config: InMemoryCacheConfig,
    expiry_timers: CancellationToken,
    _expiry_timers_guard: DropGuard,
}

impl InMemoryCache {
    /// Creates a new in-memory cache with default configuration
    pub fn new() -> Self {
        Self::with_config(InMemoryCacheConfig::default())
    }

    /// Creates a new in-memory cache with the given configuration
    pub fn with_config(config: InMemoryCacheConfig) -> Self {
        let (mutations, _) = broadcast::channel(config.notification_capacity.max(1));

        let listener_tx = mutations.clone();
        let cache = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .eviction_listener(move |key: Arc<String>, _value, cause| {
                // Removals, replacements and expiry are published by the
                // operation that caused them.
                if matches!(cause, RemovalCause::Size) {
                    let _ = listener_tx.send(KeyMutation {
                        key: key.as_ref().clone(),
                        kind: MutationKind::Removed,
                    });
                }
            })
            .build();

        let expiry_timers = CancellationToken::new();

        Self {
            cache,
            mutations,
            config,
            _expiry_timers_guard: expiry_timers.clone().drop_guard(),
            expiry_timers,
        }
    }

    /// Returns the active configuration
    pub fn config(&self) -> &InMemoryCacheConfig {
        &self.config
    }

    fn publish(&self, key: &StorageKey, kind: MutationKind) {
        // No receivers just means nobody is watching.
        let _ = self.mutations.send(KeyMutation {
            key: key.as_str().to_string(),
            kind,
        });
    }

    async fn live_entry(&self, key: &StorageKey) -> Option<CacheEntry> {
        self.cache
            .get(key.as_str())
            .await
            .filter(|entry| !entry.is_expired())
    }

    /// Removes the entry written with `expires_at` once that deadline passes
    ///
    /// A later write carries a different deadline and is left alone. Timers
    /// stop when the cache is dropped.
    fn schedule_expiry(&self, key: &StorageKey, expires_at: Instant) {
        let cache = self.cache.clone();
        let mutations = self.mutations.clone();
        let stopped = self.expiry_timers.clone();
        let key = key.as_str().to_string();

        tokio::spawn(async move {
            tokio::select! {
                _ = stopped.cancelled() => return,
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(expires_at)) => {}
            }

            let result = cache
                .entry_by_ref(key.as_str())
                .and_compute_with(|current| {
                    let op = match current {
                        Some(entry) if entry.value().expires_at == Some(expires_at) => Op::Remove,
                        _ => Op::Nop,
                    };
                    std::future::ready(op)
                })
                .await;

            if matches!(result, CompResult::Removed(_)) {
                trace!(key = %key, "in-memory entry expired");
                let _ = mutations.send(KeyMutation {
                    key,
                    kind: MutationKind::Removed,
                });
            }
        });
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn exists(&self, key: &StorageKey) -> Result<bool, DomainError> {
        Ok(self.live_entry(key).await.is_some())
    }

    async fn get(&self, key: &StorageKey) -> Result<Option<String>, DomainError> {
        Ok(self.live_entry(key).await.map(|entry| entry.data))
    }

    async fn set(
        &self,
        key: &StorageKey,
        value: &str,
        ttl: Option<Expiry>,
    ) -> Result<bool, DomainError> {
        let entry = CacheEntry::new(value, ttl);
        let expires_at = entry.expires_at;

        self.cache.insert(key.as_str().to_string(), entry).await;
        self.publish(key, MutationKind::Set);

        if let Some(expires_at) = expires_at {
            self.schedule_expiry(key, expires_at);
        }

        debug!(key = %key, "in-memory set");
        Ok(true)
    }

    async fn set_if_absent(
        &self,
        key: &StorageKey,
        value: &str,
        ttl: Option<Expiry>,
    ) -> Result<bool, DomainError> {
        let entry = CacheEntry::new(value, ttl);
        let expires_at = entry.expires_at;

        let result = self
            .cache
            .entry_by_ref(key.as_str())
            .and_compute_with(move |current| {
                let op = match current {
                    Some(current) if !current.value().is_expired() => Op::Nop,
                    _ => Op::Put(entry),
                };
                std::future::ready(op)
            })
            .await;

        let written = matches!(
            result,
            CompResult::Inserted(_) | CompResult::ReplacedWith(_)
        );

        if written {
            self.publish(key, MutationKind::Set);

            if let Some(expires_at) = expires_at {
                self.schedule_expiry(key, expires_at);
            }
        }

        debug!(key = %key, written, "in-memory set_if_absent");
        Ok(written)
    }

    async fn remove(&self, key: &StorageKey) -> Result<bool, DomainError> {
        let Some(entry) = self.cache.remove(key.as_str()).await else {
            return Ok(false);
        };

        // A lapsed entry whose timer has not fired yet still counts as a removal
        // for watchers, but not for the caller.
        self.publish(key, MutationKind::Removed);

        Ok(!entry.is_expired())
    }

    async fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

#[async_trait]
impl MutationNotifier for InMemoryCache {
    async fn watch(
        &self,
        key: &StorageKey,
    ) -> Result<Box<dyn MutationSubscription>, DomainError> {
        Ok(Box::new(InMemorySubscription {
            key: key.clone(),
            receiver: Some(self.mutations.subscribe()),
        }))
    }
}

/// Broadcast receiver filtered down to one key
#[derive(Debug)]
pub struct InMemorySubscription {
    key: StorageKey,
    receiver: Option<broadcast::Receiver<KeyMutation>>,
}

#[async_trait]
impl MutationSubscription for InMemorySubscription {
    async fn next_event(&mut self) -> Result<Option<MutationEvent>, DomainError> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(DomainError::subscription("subscription already closed"));
        };

        loop {
            match receiver.recv().await {
                Ok(mutation) if mutation.key == self.key.as_str() => {
                    return Ok(Some(MutationEvent::new(mutation.kind)));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    // The watched key may have been among the skipped events;
                    // report a write so the waiter re-reads the current value.
                    warn!(key = %self.key, skipped, "mutation channel lagged");
                    return Ok(Some(MutationEvent::new(MutationKind::Set)));
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> Result<(), DomainError> {
        self.receiver.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(name: &str) -> StorageKey {
        StorageKey::resolve(Some("test"), name)
    }

    fn ttl(secs: u64) -> Option<Expiry> {
        Some(Expiry::from_secs(secs).unwrap())
    }

    async fn next_event(subscription: &mut Box<dyn MutationSubscription>) -> MutationEvent {
        tokio::time::timeout(Duration::from_secs(2), subscription.next_event())
            .await
            .expect("no event within 2s")
            .unwrap()
            .expect("stream ended")
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = InMemoryCache::new();

        assert!(cache.set(&key("key1"), "value1", ttl(60)).await.unwrap());

        let result = cache.get(&key("key1")).await.unwrap();
        assert_eq!(result, Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let cache = InMemoryCache::new();

        assert!(cache.get(&key("missing")).await.unwrap().is_none());
        assert!(!cache.exists(&key("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_without_ttl_does_not_expire() {
        let cache = InMemoryCache::new();

        cache.set(&key("key1"), "value1", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(cache.exists(&key("key1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove() {
        let cache = InMemoryCache::new();

        cache.set(&key("key1"), "value1", ttl(60)).await.unwrap();

        assert!(cache.remove(&key("key1")).await.unwrap());
        assert!(!cache.remove(&key("key1")).await.unwrap());
        assert!(cache.get(&key("key1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_missing() {
        let cache = InMemoryCache::new();

        assert!(!cache.remove(&key("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let cache = InMemoryCache::new();

        cache.set(&key("key1"), "value1", ttl(1)).await.unwrap();
        assert!(cache.exists(&key("key1")).await.unwrap());

        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert!(!cache.exists(&key("key1")).await.unwrap());
        assert!(cache.get(&key("key1")).await.unwrap().is_none());
        assert!(!cache.remove(&key("key1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let cache = InMemoryCache::new();

        assert!(cache.set_if_absent(&key("lock"), "owner-A", ttl(30)).await.unwrap());
        assert!(!cache.set_if_absent(&key("lock"), "owner-B", ttl(30)).await.unwrap());

        let value = cache.get(&key("lock")).await.unwrap();
        assert_eq!(value, Some("owner-A".to_string()));
    }

    #[tokio::test]
    async fn test_set_if_absent_after_expiry() {
        let cache = InMemoryCache::new();

        cache.set(&key("lock"), "owner-A", ttl(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert!(cache.set_if_absent(&key("lock"), "owner-B", ttl(30)).await.unwrap());
        assert_eq!(
            cache.get(&key("lock")).await.unwrap(),
            Some("owner-B".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_set_if_absent_is_exclusive() {
        let cache = Arc::new(InMemoryCache::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let owner = format!("owner-{i}");
                    let won = cache
                        .set_if_absent(&key("claim"), &owner, None)
                        .await
                        .unwrap();
                    (owner, won)
                })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            let (owner, won) = handle.await.unwrap();
            if won {
                winners.push(owner);
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(cache.get(&key("claim")).await.unwrap(), Some(winners[0].clone()));
    }

    #[tokio::test]
    async fn test_watch_receives_set() {
        let cache = InMemoryCache::new();
        let mut subscription = cache.watch(&key("station")).await.unwrap();

        cache.set(&key("station"), "online", None).await.unwrap();

        assert_eq!(next_event(&mut subscription).await.kind, MutationKind::Set);
    }

    #[tokio::test]
    async fn test_watch_receives_removal() {
        let cache = InMemoryCache::new();
        cache.set(&key("station"), "online", None).await.unwrap();

        let mut subscription = cache.watch(&key("station")).await.unwrap();
        cache.remove(&key("station")).await.unwrap();

        assert_eq!(next_event(&mut subscription).await.kind, MutationKind::Removed);
    }

    #[tokio::test]
    async fn test_watch_ignores_other_keys() {
        let cache = InMemoryCache::new();
        let mut subscription = cache.watch(&key("watched")).await.unwrap();

        cache.set(&key("other"), "x", None).await.unwrap();
        cache.remove(&key("other")).await.unwrap();
        cache.set(&key("watched"), "y", None).await.unwrap();

        assert_eq!(next_event(&mut subscription).await.kind, MutationKind::Set);
    }

    #[tokio::test]
    async fn test_watch_does_not_see_earlier_mutations() {
        let cache = InMemoryCache::new();
        cache.set(&key("station"), "online", None).await.unwrap();

        let mut subscription = cache.watch(&key("station")).await.unwrap();

        let result =
            tokio::time::timeout(Duration::from_millis(100), subscription.next_event()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_failed_set_if_absent_is_not_published() {
        let cache = InMemoryCache::new();
        cache.set(&key("lock"), "owner-A", None).await.unwrap();

        let mut subscription = cache.watch(&key("lock")).await.unwrap();
        cache.set_if_absent(&key("lock"), "owner-B", None).await.unwrap();

        let result =
            tokio::time::timeout(Duration::from_millis(100), subscription.next_event()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_expiry_is_published_as_removal() {
        let cache = InMemoryCache::new();
        cache.set(&key("session"), "abc", ttl(1)).await.unwrap();

        let mut subscription = cache.watch(&key("session")).await.unwrap();
        let started = Instant::now();

        assert_eq!(next_event(&mut subscription).await.kind, MutationKind::Removed);
        assert!(started.elapsed() < Duration::from_millis(1800));
        assert!(!cache.exists(&key("session")).await.unwrap());
    }

    #[tokio::test]
    async fn test_overwritten_entry_does_not_expire_early() {
        let cache = InMemoryCache::new();
        cache.set(&key("session"), "first", ttl(1)).await.unwrap();
        cache.set(&key("session"), "second", None).await.unwrap();

        let mut subscription = cache.watch(&key("session")).await.unwrap();

        let result =
            tokio::time::timeout(Duration::from_millis(1500), subscription.next_event()).await;
        assert!(result.is_err());
        assert_eq!(
            cache.get(&key("session")).await.unwrap(),
            Some("second".to_string())
        );
    }

    #[tokio::test]
    async fn test_removed_entry_is_not_expired_again() {
        let cache = InMemoryCache::new();
        cache.set(&key("session"), "abc", ttl(1)).await.unwrap();
        cache.remove(&key("session")).await.unwrap();

        let mut subscription = cache.watch(&key("session")).await.unwrap();

        let result =
            tokio::time::timeout(Duration::from_millis(1500), subscription.next_event()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_claimed_entry_expires() {
        let cache = InMemoryCache::new();
        assert!(cache.set_if_absent(&key("lock"), "owner-A", ttl(1)).await.unwrap());

        let mut subscription = cache.watch(&key("lock")).await.unwrap();

        assert_eq!(next_event(&mut subscription).await.kind, MutationKind::Removed);
        assert!(cache.set_if_absent(&key("lock"), "owner-B", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_entry_at_max_ttl() {
        let cache = InMemoryCache::new();
        let ttl = Some(Expiry::from_secs(crate::domain::cache::MAX_TTL_SECS).unwrap());

        assert!(cache.set(&key("forever"), "v", ttl).await.unwrap());
        assert!(cache.exists(&key("forever")).await.unwrap());
    }

    #[tokio::test]
    async fn test_lagged_subscription_reports_set() {
        let cache =
            InMemoryCache::with_config(InMemoryCacheConfig::default().with_notification_capacity(2));
        let mut subscription = cache.watch(&key("watched")).await.unwrap();

        for i in 0..8 {
            cache.set(&key("noise"), &i.to_string(), None).await.unwrap();
        }

        assert_eq!(next_event(&mut subscription).await.kind, MutationKind::Set);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let cache = InMemoryCache::new();
        let mut subscription = cache.watch(&key("station")).await.unwrap();

        subscription.close().await.unwrap();
        subscription.close().await.unwrap();

        assert!(subscription.next_event().await.is_err());
    }

    #[test]
    fn test_config() {
        let config = InMemoryCacheConfig::default()
            .with_max_capacity(100)
            .with_notification_capacity(0);

        let cache = InMemoryCache::with_config(config);

        assert_eq!(cache.config().max_capacity, 100);
        assert_eq!(cache.config().notification_capacity, 1);
    }
}
