//! Observability infrastructure - Cache metrics

mod metrics;

pub use metrics::{CacheOperation, record_cache_operation, record_wait_resolution};
