use derive_more::{Display, From};
use thiserror::Error;

/// A store prefix.
///
/// A prefix is either empty (the root) or a valid key followed by a trailing `/`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StorePrefix(String);

/// An invalid store prefix.
#[derive(Clone, Debug, Error, From)]
#[error("invalid store prefix {0}")]
pub struct StorePrefixError(String);

impl StorePrefix {
    /// Create a new store prefix from `prefix`.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if `prefix` is not valid according to [`StorePrefix::validate`()].
    pub fn new(prefix: impl Into<String>) -> Result<Self, StorePrefixError> {
        let prefix = prefix.into();
        if Self::validate(&prefix) {
            Ok(Self(prefix))
        } else {
            Err(StorePrefixError(prefix))
        }
    }

    /// Extracts a string slice containing the prefix `String`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a prefix.
    #[must_use]
    pub fn validate(prefix: &str) -> bool {
        prefix.is_empty()
            || prefix
                .strip_suffix('/')
                .is_some_and(crate::StoreKey::validate)
    }
}

impl TryFrom<&str> for StorePrefix {
    type Error = StorePrefixError;

    fn try_from(prefix: &str) -> Result<Self, StorePrefixError> {
        Self::new(prefix)
    }
}
