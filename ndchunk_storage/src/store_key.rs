use derive_more::{Display, From};
use thiserror::Error;

use super::StorePrefix;

/// A store key.
///
/// A key is a `/` separated string which does not start or end with `/` and is not empty.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StoreKey(String);

/// An invalid store key.
#[derive(Clone, Debug, From, Error)]
#[error("invalid store key {0}")]
pub struct StoreKeyError(String);

/// A list of [`StoreKey`].
pub type StoreKeys = Vec<StoreKey>;

impl StoreKey {
    /// Create a new store key from `key`.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if `key` is not valid according to [`StoreKey::validate()`].
    pub fn new(key: impl Into<String>) -> Result<Self, StoreKeyError> {
        let key = key.into();
        if Self::validate(&key) {
            Ok(Self(key))
        } else {
            Err(StoreKeyError(key))
        }
    }

    /// Extracts a string slice of the underlying key [`String`].
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a key.
    ///
    /// A key cannot be empty, start or end with `/`, or contain an empty, `.`, or `..` component.
    #[must_use]
    pub fn validate(key: &str) -> bool {
        !key.is_empty()
            && key
                .split('/')
                .all(|component| !component.is_empty() && component != "." && component != "..")
    }

    /// Returns true if the key has prefix `prefix`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &StorePrefix) -> bool {
        self.0.starts_with(prefix.as_str())
    }
}

impl TryFrom<&str> for StoreKey {
    type Error = StoreKeyError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_key() {
        assert!(StoreKey::new("a").is_ok());
        assert_eq!(StoreKey::new("a").unwrap().to_string(), "a");
        assert!(StoreKey::new("a/").is_err());
        assert_eq!(
            StoreKey::new("a/").unwrap_err().to_string(),
            "invalid store key a/"
        );
        assert!(StoreKey::new("/a").is_err());
        assert!(StoreKey::new("").is_err());
        assert!(StoreKey::new("a//b").is_err());
        assert!(StoreKey::new("../a").is_err());
        assert!(!StoreKey::new("chunks10")
            .unwrap()
            .has_prefix(&StorePrefix::new("chunks/").unwrap()));
        assert!(StoreKey::new("vlmeta")
            .unwrap()
            .has_prefix(&StorePrefix::new("").unwrap()));
        assert!(StoreKey::new("chunks/3")
            .unwrap()
            .has_prefix(&StorePrefix::new("chunks/").unwrap()));
    }
}
