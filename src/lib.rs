//! fleet-cache
//!
//! Distributed coordination cache shared by the instances of a horizontally
//! scaled charging station management server:
//! - Namespaced keys with TTL expiry and atomic claim-if-vacant writes
//! - `wait_for_change`: block until another instance mutates a key, or time out
//! - Redis (keyspace notifications) and in-memory (moka) backends
//! - Blocking variants for call sites that cannot suspend

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{Cache, CacheExt, DomainError, Json, from_fn};
pub use infrastructure::cache::{CacheConfig, CacheType};
pub use infrastructure::services::CacheService;
