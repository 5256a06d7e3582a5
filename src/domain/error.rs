use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Format error: {message}")]
    Format { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Cancelled: {message}")]
    Cancelled { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// A notification subscription could not be established or was lost.
    ///
    /// Surfaces as store-unavailable to the enclosing wait.
    pub fn subscription(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: format!("subscription failed: {}", message.into()),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_error() {
        let error = DomainError::store_unavailable("connection refused");
        assert_eq!(error.to_string(), "Store unavailable: connection refused");
        assert!(error.is_store_unavailable());
    }

    #[test]
    fn test_subscription_error_is_store_unavailable() {
        let error = DomainError::subscription("stream closed");
        assert!(error.is_store_unavailable());
        assert_eq!(
            error.to_string(),
            "Store unavailable: subscription failed: stream closed"
        );
    }

    #[test]
    fn test_format_error() {
        let error = DomainError::format("expected value at line 1 column 1");
        assert!(error.is_format());
        assert!(!error.is_store_unavailable());
    }
}
