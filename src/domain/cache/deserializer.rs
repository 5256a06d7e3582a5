//! Caller-supplied strategies for turning stored payloads into typed values

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::domain::DomainError;

/// Converts a stored payload into `T`
///
/// Failures are format errors, never store errors.
pub trait Deserializer<T> {
    fn deserialize(&self, raw: &str) -> Result<T, DomainError>;
}

/// JSON payloads decoded with serde
pub struct Json<T>(PhantomData<fn() -> T>);

impl<T> Json<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Json<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Json<T> {}

impl<T> fmt::Debug for Json<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Json")
    }
}

impl<T: DeserializeOwned> Deserializer<T> for Json<T> {
    fn deserialize(&self, raw: &str) -> Result<T, DomainError> {
        serde_json::from_str(raw).map_err(|e| {
            DomainError::format(format!("Failed to deserialize cache value: {}", e))
        })
    }
}

/// Adapts a plain function or closure into a [`Deserializer`]
#[derive(Clone, Copy)]
pub struct FnDeserializer<F>(F);

impl<F> fmt::Debug for FnDeserializer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnDeserializer")
    }
}

/// Wraps `f` so it can be passed where a [`Deserializer`] is expected
pub fn from_fn<T, E, F>(f: F) -> FnDeserializer<F>
where
    F: Fn(&str) -> Result<T, E>,
    E: fmt::Display,
{
    FnDeserializer(f)
}

impl<T, E, F> Deserializer<T> for FnDeserializer<F>
where
    F: Fn(&str) -> Result<T, E>,
    E: fmt::Display,
{
    fn deserialize(&self, raw: &str) -> Result<T, DomainError> {
        (self.0)(raw).map_err(|e| {
            DomainError::format(format!("Failed to deserialize cache value: {}", e))
        })
    }
}
