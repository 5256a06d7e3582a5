//! Mutation events and notifier contracts

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::StorageKey;
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// What happened to a watched key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// A value was written
    Set,
    /// The entry was deleted, expired or evicted
    Removed,
}

impl MutationKind {
    /// Maps a Redis keyspace notification payload to a mutation kind
    ///
    /// Events that neither write nor remove the value (`expire`, `persist`, ...)
    /// map to `None`.
    pub fn from_keyspace_event(event: &str) -> Option<Self> {
        match event {
            "set" | "setrange" | "append" | "incrby" | "decrby" | "incrbyfloat"
            | "rename_to" | "restore" | "copy_to" => Some(Self::Set),
            "del" | "expired" | "evicted" | "rename_from" => Some(Self::Removed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Removed => "removed",
        }
    }
}

/// A single change observed on a watched key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    pub kind: MutationKind,
    pub observed_at: DateTime<Utc>,
}

impl MutationEvent {
    pub fn new(kind: MutationKind) -> Self {
        Self {
            kind,
            observed_at: Utc::now(),
        }
    }
}

/// Live subscription to the mutations of one storage key
///
/// Delivery is best effort: events may be duplicated, delayed or dropped, and
/// mutations that happened before the subscription was opened are never seen.
#[async_trait]
pub trait MutationSubscription: Send {
    /// Waits for the next event
    ///
    /// Returns `Ok(None)` once the underlying stream has ended.
    async fn next_event(&mut self) -> Result<Option<MutationEvent>, DomainError>;

    /// Releases the subscription; safe to call more than once
    async fn close(&mut self) -> Result<(), DomainError>;
}

/// Opens per-key mutation subscriptions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MutationNotifier: Send + Sync + std::fmt::Debug {
    /// Subscribes to mutations of `key`
    async fn watch(
        &self,
        key: &StorageKey,
    ) -> Result<Box<dyn MutationSubscription>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyspace_write_events() {
        for event in ["set", "setrange", "append", "incrby", "incrbyfloat", "rename_to"] {
            assert_eq!(
                MutationKind::from_keyspace_event(event),
                Some(MutationKind::Set),
                "{event}"
            );
        }
    }

    #[test]
    fn test_keyspace_removal_events() {
        for event in ["del", "expired", "evicted", "rename_from"] {
            assert_eq!(
                MutationKind::from_keyspace_event(event),
                Some(MutationKind::Removed),
                "{event}"
            );
        }
    }

    #[test]
    fn test_keyspace_ignored_events() {
        assert_eq!(MutationKind::from_keyspace_event("expire"), None);
        assert_eq!(MutationKind::from_keyspace_event("persist"), None);
        assert_eq!(MutationKind::from_keyspace_event(""), None);
    }

    #[test]
    fn test_event_records_observation_time() {
        let before = Utc::now();
        let event = MutationEvent::new(MutationKind::Removed);
        assert_eq!(event.kind, MutationKind::Removed);
        assert!(event.observed_at >= before);
    }
}
