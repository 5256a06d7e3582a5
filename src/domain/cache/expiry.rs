//! Entry expiry

use std::time::Duration;

use crate::domain::DomainError;

/// Longest TTL accepted, one hundred years
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Time-to-live attached to a write, in whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Expiry(u64);

impl Expiry {
    /// Creates an expiry of `secs` seconds
    ///
    /// Zero and anything above [`MAX_TTL_SECS`] are rejected.
    pub fn from_secs(secs: u64) -> Result<Self, DomainError> {
        if secs == 0 {
            return Err(DomainError::validation("TTL must be a positive number of seconds"));
        }

        if secs > MAX_TTL_SECS {
            return Err(DomainError::validation(format!(
                "TTL of {} seconds exceeds the maximum of {} seconds",
                secs, MAX_TTL_SECS
            )));
        }

        Ok(Self(secs))
    }

    /// Converts an optional caller-supplied TTL
    pub fn from_optional_secs(secs: Option<u64>) -> Result<Option<Self>, DomainError> {
        secs.map(Self::from_secs).transpose()
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}
