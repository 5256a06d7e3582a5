//! Cache domain - namespaced keys, backing store and mutation notification contracts

mod deserializer;
mod event;
mod expiry;
mod facade;
mod key;
mod repository;

pub use deserializer::{Deserializer, FnDeserializer, Json, from_fn};
pub use event::{MutationEvent, MutationKind, MutationNotifier, MutationSubscription};
pub use expiry::{Expiry, MAX_TTL_SECS};
pub use facade::{Cache, CacheExt};
pub use key::{DEFAULT_NAMESPACE, StorageKey};
pub use repository::CacheStore;

#[cfg(test)]
pub use event::MockMutationNotifier;
#[cfg(test)]
pub use repository::MockCacheStore;
