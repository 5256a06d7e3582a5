//! Backing store trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use super::{Expiry, StorageKey};
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Operational surface over the shared key-value store
///
/// Keys are already namespaced; values are opaque strings the store never
/// inspects. Every failure is reported as [`DomainError::StoreUnavailable`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Returns true iff a live entry exists
    async fn exists(&self, key: &StorageKey) -> Result<bool, DomainError>;

    /// Gets the current payload, `None` if missing or expired
    async fn get(&self, key: &StorageKey) -> Result<Option<String>, DomainError>;

    /// Unconditionally writes `value`, optionally expiring after `ttl`
    async fn set(
        &self,
        key: &StorageKey,
        value: &str,
        ttl: Option<Expiry>,
    ) -> Result<bool, DomainError>;

    /// Writes `value` only if no live entry exists
    ///
    /// Atomic with respect to concurrent writers of the same key. Returns false
    /// without side effects when an entry is already present.
    async fn set_if_absent(
        &self,
        key: &StorageKey,
        value: &str,
        ttl: Option<Expiry>,
    ) -> Result<bool, DomainError>;

    /// Deletes the entry, returning true iff one was present
    async fn remove(&self, key: &StorageKey) -> Result<bool, DomainError>;

    /// Checks that the store is reachable
    async fn ping(&self) -> Result<(), DomainError>;
}
