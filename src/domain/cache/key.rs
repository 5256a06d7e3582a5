//! Key namespacing

use std::fmt;

/// Namespace applied when the caller does not name one
pub const DEFAULT_NAMESPACE: &str = "default";

const SEPARATOR: char = ':';

/// Fully resolved key as it is stored in the backing store
///
/// Only [`StorageKey::resolve`] constructs one, so every key that reaches a
/// store has passed through the namespacer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// Resolves `(namespace, key)` to `<namespace>:<key>`
    ///
    /// An absent or empty namespace resolves to [`DEFAULT_NAMESPACE`].
    pub fn resolve(namespace: Option<&str>, key: &str) -> Self {
        let namespace = match namespace {
            Some(ns) if !ns.is_empty() => ns,
            _ => DEFAULT_NAMESPACE,
        };

        let mut resolved = String::with_capacity(namespace.len() + 1 + key.len());
        resolved.push_str(namespace);
        resolved.push(SEPARATOR);
        resolved.push_str(key);

        Self(resolved)
    }

    /// Returns the storage key string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
