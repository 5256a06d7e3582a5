//! Cache service - the cache facade handed to protocol handlers and the session manager

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::domain::DomainError;
use crate::domain::cache::{Cache, CacheStore, Expiry, StorageKey};
use crate::infrastructure::cache::{CacheBackend, CacheConfig, CacheFactory};
use crate::infrastructure::observability::{CacheOperation, record_cache_operation};

use super::blocking::BlockingBridge;
use super::change_wait::ChangeWaitCoordinator;

/// Explicitly constructed cache facade
///
/// Cloning is cheap; clones share the store connection and the blocking
/// workers. Call [`CacheService::shutdown`] to release them deterministically.
#[derive(Clone)]
pub struct CacheService {
    store: Arc<dyn CacheStore>,
    coordinator: ChangeWaitCoordinator,
    bridge: Arc<BlockingBridge>,
}

impl fmt::Debug for CacheService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheService")
            .field("store", &self.store)
            .field("workers", &self.bridge.workers())
            .finish()
    }
}

impl CacheService {
    /// Creates a service over an existing backend
    pub fn new(backend: CacheBackend, bridge: BlockingBridge) -> Self {
        Self {
            coordinator: ChangeWaitCoordinator::new(backend.store.clone(), backend.notifier),
            store: backend.store,
            bridge: Arc::new(bridge),
        }
    }

    /// Connects the configured backend from async code
    ///
    /// The backend is created on the blocking workers so its connection
    /// driver keeps running while a caller is parked in a blocking call.
    pub async fn connect(config: &CacheConfig) -> Result<Self, DomainError> {
        let bridge = BlockingBridge::new(config.blocking_workers)?;

        let factory_config = config.clone();
        let backend = bridge
            .spawn(async move { CacheFactory::new().create(&factory_config).await })
            .await?;

        info!(backend = %config.backend, workers = bridge.workers(), "Cache service connected");
        Ok(Self::new(backend, bridge))
    }

    /// Connects the configured backend from synchronous code
    pub fn connect_blocking(config: &CacheConfig) -> Result<Self, DomainError> {
        let bridge = BlockingBridge::new(config.blocking_workers)?;

        let factory_config = config.clone();
        let backend =
            bridge.run(async move { CacheFactory::new().create(&factory_config).await })?;

        info!(backend = %config.backend, workers = bridge.workers(), "Cache service connected");
        Ok(Self::new(backend, bridge))
    }

    /// Checks that the backing store is reachable
    pub async fn ping(&self) -> Result<(), DomainError> {
        self.store.ping().await
    }

    /// Releases the blocking workers
    ///
    /// Store connections close once the last clone of the service is dropped.
    pub fn shutdown(self) {
        let Self { bridge, .. } = self;

        match Arc::try_unwrap(bridge) {
            Ok(bridge) => bridge.shutdown(),
            Err(_) => debug!("Cache service still shared; workers stop with the last clone"),
        }
    }

    fn observe<T>(
        operation: CacheOperation,
        started: Instant,
        result: Result<T, DomainError>,
    ) -> Result<T, DomainError> {
        record_cache_operation(operation, result.is_ok(), started.elapsed());
        result
    }

    fn owned_namespace(namespace: Option<&str>) -> Option<String> {
        namespace.map(str::to_string)
    }
}

#[async_trait]
impl Cache for CacheService {
    #[instrument(skip(self))]
    async fn exists(&self, key: &str, namespace: Option<&str>) -> Result<bool, DomainError> {
        let started = Instant::now();
        let key = StorageKey::resolve(namespace, key);

        Self::observe(CacheOperation::Exists, started, self.store.exists(&key).await)
    }

    #[instrument(skip(self))]
    async fn remove(&self, key: &str, namespace: Option<&str>) -> Result<bool, DomainError> {
        let started = Instant::now();
        let key = StorageKey::resolve(namespace, key);

        Self::observe(CacheOperation::Remove, started, self.store.remove(&key).await)
    }

    #[instrument(skip(self))]
    async fn get(
        &self,
        key: &str,
        namespace: Option<&str>,
    ) -> Result<Option<String>, DomainError> {
        let started = Instant::now();
        let key = StorageKey::resolve(namespace, key);

        Self::observe(CacheOperation::Get, started, self.store.get(&key).await)
    }

    #[instrument(skip(self, value))]
    async fn set(
        &self,
        key: &str,
        value: &str,
        namespace: Option<&str>,
        ttl_secs: Option<u64>,
    ) -> Result<bool, DomainError> {
        let started = Instant::now();
        let ttl = Expiry::from_optional_secs(ttl_secs)?;
        let key = StorageKey::resolve(namespace, key);

        Self::observe(CacheOperation::Set, started, self.store.set(&key, value, ttl).await)
    }

    #[instrument(skip(self, value))]
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        namespace: Option<&str>,
        ttl_secs: Option<u64>,
    ) -> Result<bool, DomainError> {
        let started = Instant::now();
        let ttl = Expiry::from_optional_secs(ttl_secs)?;
        let key = StorageKey::resolve(namespace, key);

        let result = self.store.set_if_absent(&key, value, ttl).await;
        if let Ok(claimed) = &result {
            debug!(key = %key, claimed, "set_if_absent");
        }

        Self::observe(CacheOperation::SetIfAbsent, started, result)
    }

    #[instrument(skip(self, cancel))]
    async fn wait_for_change_with_cancel(
        &self,
        key: &str,
        timeout_secs: u64,
        namespace: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, DomainError> {
        let started = Instant::now();
        let key = StorageKey::resolve(namespace, key);

        let result = self
            .coordinator
            .wait_for_change(&key, Duration::from_secs(timeout_secs), cancel)
            .await
            .map(|outcome| outcome.value);

        Self::observe(CacheOperation::WaitForChange, started, result)
    }

    fn get_blocking(
        &self,
        key: &str,
        namespace: Option<&str>,
    ) -> Result<Option<String>, DomainError> {
        let this = self.clone();
        let key = key.to_string();
        let namespace = Self::owned_namespace(namespace);

        self.bridge
            .run(async move { this.get(&key, namespace.as_deref()).await })
    }

    fn set_blocking(
        &self,
        key: &str,
        value: &str,
        namespace: Option<&str>,
        ttl_secs: Option<u64>,
    ) -> Result<bool, DomainError> {
        let this = self.clone();
        let key = key.to_string();
        let value = value.to_string();
        let namespace = Self::owned_namespace(namespace);

        self.bridge.run(async move {
            this.set(&key, &value, namespace.as_deref(), ttl_secs)
                .await
        })
    }

    fn wait_for_change_blocking(
        &self,
        key: &str,
        timeout_secs: u64,
        namespace: Option<&str>,
    ) -> Result<Option<String>, DomainError> {
        let this = self.clone();
        let key = key.to_string();
        let namespace = Self::owned_namespace(namespace);

        self.bridge.run(async move {
            this.wait_for_change(&key, timeout_secs, namespace.as_deref())
                .await
        })
    }
}
