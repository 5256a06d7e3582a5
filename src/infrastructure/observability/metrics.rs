//! Cache metrics
//!
//! Emitted through the `metrics` facade; the host process decides whether a
//! recorder (Prometheus or otherwise) is installed.

use std::time::Duration;

use metrics::{counter, histogram};

/// Operations reported in `cache_operations_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOperation {
    Exists,
    Get,
    Set,
    SetIfAbsent,
    Remove,
    WaitForChange,
}

impl CacheOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Get => "get",
            Self::Set => "set",
            Self::SetIfAbsent => "set_if_absent",
            Self::Remove => "remove",
            Self::WaitForChange => "wait_for_change",
        }
    }
}

/// Record a completed cache operation
pub fn record_cache_operation(operation: CacheOperation, success: bool, duration: Duration) {
    let labels = [
        ("op", operation.as_str().to_string()),
        ("status", if success { "success" } else { "error" }.to_string()),
    ];

    counter!("cache_operations_total", &labels).increment(1);
    histogram!("cache_operation_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Record how a change-wait was resolved
pub fn record_wait_resolution(resolution: &'static str, waited: Duration) {
    counter!("cache_wait_resolutions_total", "resolution" => resolution).increment(1);
    histogram!("cache_wait_duration_seconds", "resolution" => resolution)
        .record(waited.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_labels() {
        assert_eq!(CacheOperation::SetIfAbsent.as_str(), "set_if_absent");
        assert_eq!(CacheOperation::WaitForChange.as_str(), "wait_for_change");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_cache_operation(CacheOperation::Get, true, Duration::from_millis(3));
        record_wait_resolution("timeout", Duration::from_secs(1));
    }
}
