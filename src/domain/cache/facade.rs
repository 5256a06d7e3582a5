//! Cache capability contract consumed by protocol handlers and the session manager

use std::fmt::Debug;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::Deserializer;
use crate::domain::DomainError;

/// Namespaced cache with TTL, conditional writes and change waiting
///
/// Every method takes the caller's local key and an optional namespace
/// (`"default"` when absent). TTLs are whole seconds. Values are opaque
/// strings; use [`CacheExt`] for typed reads.
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    /// Returns true iff a live entry exists
    async fn exists(&self, key: &str, namespace: Option<&str>) -> Result<bool, DomainError>;

    /// Deletes the entry, returning true iff one was present
    async fn remove(&self, key: &str, namespace: Option<&str>) -> Result<bool, DomainError>;

    /// Gets the current payload, `None` if missing or expired
    async fn get(
        &self,
        key: &str,
        namespace: Option<&str>,
    ) -> Result<Option<String>, DomainError>;

    /// Unconditionally writes `value`
    async fn set(
        &self,
        key: &str,
        value: &str,
        namespace: Option<&str>,
        ttl_secs: Option<u64>,
    ) -> Result<bool, DomainError>;

    /// Writes `value` only if no live entry exists
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        namespace: Option<&str>,
        ttl_secs: Option<u64>,
    ) -> Result<bool, DomainError>;

    /// Waits for the next mutation of the key, or `timeout_secs`
    ///
    /// Resolves with the value read after a write or after the timeout, and
    /// with `None` after a removal. A timed-out result may equal the value
    /// from before the call; callers cannot tell "unchanged" apart from
    /// "changed but the notification was missed".
    async fn wait_for_change(
        &self,
        key: &str,
        timeout_secs: u64,
        namespace: Option<&str>,
    ) -> Result<Option<String>, DomainError> {
        let cancel = CancellationToken::new();
        self.wait_for_change_with_cancel(key, timeout_secs, namespace, &cancel)
            .await
    }

    /// [`Cache::wait_for_change`] that also resolves early, with
    /// [`DomainError::Cancelled`], once `cancel` fires
    async fn wait_for_change_with_cancel(
        &self,
        key: &str,
        timeout_secs: u64,
        namespace: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, DomainError>;

    /// Blocking [`Cache::get`] for call sites that cannot suspend
    fn get_blocking(
        &self,
        key: &str,
        namespace: Option<&str>,
    ) -> Result<Option<String>, DomainError>;

    /// Blocking [`Cache::set`] for call sites that cannot suspend
    fn set_blocking(
        &self,
        key: &str,
        value: &str,
        namespace: Option<&str>,
        ttl_secs: Option<u64>,
    ) -> Result<bool, DomainError>;

    /// Blocking [`Cache::wait_for_change`] for call sites that cannot suspend
    fn wait_for_change_blocking(
        &self,
        key: &str,
        timeout_secs: u64,
        namespace: Option<&str>,
    ) -> Result<Option<String>, DomainError>;
}

/// Typed reads and writes on top of [`Cache`]
pub trait CacheExt: Cache {
    /// Gets a value decoded by `deserializer`
    fn get_as<'a, T, D>(
        &'a self,
        key: &'a str,
        namespace: Option<&'a str>,
        deserializer: &'a D,
    ) -> impl std::future::Future<Output = Result<Option<T>, DomainError>> + Send + 'a
    where
        T: Send + 'a,
        D: Deserializer<T> + Sync + ?Sized,
    {
        async move {
            self.get(key, namespace)
                .await?
                .map(|raw| deserializer.deserialize(&raw))
                .transpose()
        }
    }

    /// Blocking [`CacheExt::get_as`]; decoding happens on the calling thread
    fn get_blocking_as<T, D>(
        &self,
        key: &str,
        namespace: Option<&str>,
        deserializer: &D,
    ) -> Result<Option<T>, DomainError>
    where
        D: Deserializer<T> + ?Sized,
    {
        self.get_blocking(key, namespace)?
            .map(|raw| deserializer.deserialize(&raw))
            .transpose()
    }

    /// Waits for a change and decodes the resulting value
    fn wait_for_change_as<'a, T, D>(
        &'a self,
        key: &'a str,
        timeout_secs: u64,
        namespace: Option<&'a str>,
        deserializer: &'a D,
    ) -> impl std::future::Future<Output = Result<Option<T>, DomainError>> + Send + 'a
    where
        T: Send + 'a,
        D: Deserializer<T> + Sync + ?Sized,
    {
        async move {
            self.wait_for_change(key, timeout_secs, namespace)
                .await?
                .map(|raw| deserializer.deserialize(&raw))
                .transpose()
        }
    }

    /// Blocking [`CacheExt::wait_for_change_as`]
    fn wait_for_change_blocking_as<T, D>(
        &self,
        key: &str,
        timeout_secs: u64,
        namespace: Option<&str>,
        deserializer: &D,
    ) -> Result<Option<T>, DomainError>
    where
        D: Deserializer<T> + ?Sized,
    {
        self.wait_for_change_blocking(key, timeout_secs, namespace)?
            .map(|raw| deserializer.deserialize(&raw))
            .transpose()
    }

    /// Serializes `value` as JSON and writes it
    fn set_json<'a, V>(
        &'a self,
        key: &'a str,
        value: &'a V,
        namespace: Option<&'a str>,
        ttl_secs: Option<u64>,
    ) -> impl std::future::Future<Output = Result<bool, DomainError>> + Send + 'a
    where
        V: Serialize + Sync + ?Sized,
    {
        async move {
            let data = serde_json::to_string(value).map_err(|e| {
                DomainError::format(format!("Failed to serialize cache value: {}", e))
            })?;
            self.set(key, &data, namespace, ttl_secs).await
        }
    }
}

// Blanket implementation for all types implementing Cache
impl<C: Cache + ?Sized> CacheExt for C {}
