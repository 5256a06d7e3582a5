//! Infrastructure layer - backing stores, services and observability

pub mod cache;
pub mod logging;
pub mod observability;
pub mod services;
