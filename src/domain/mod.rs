//! Domain layer - cache contracts and errors

pub mod cache;
pub mod error;

pub use cache::{
    Cache, CacheExt, CacheStore, DEFAULT_NAMESPACE, Deserializer, Expiry, Json, MutationEvent,
    MutationKind, MutationNotifier, MutationSubscription, StorageKey, from_fn,
};
pub use error::DomainError;
