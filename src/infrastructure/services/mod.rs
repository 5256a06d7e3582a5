//! Infrastructure services

mod blocking;
mod cache_service;
mod change_wait;

pub use blocking::BlockingBridge;
pub use cache_service::CacheService;
pub use change_wait::{ChangeWaitCoordinator, WaitOutcome, WaitResolution};
