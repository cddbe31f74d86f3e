//! The storage API for the `ndchunk` crate.
//!
//! A store holds the header, metadata, and compressed chunk records of one array under string keys.
//! This crate defines the store traits and includes an in-memory store. Persistent stores are in
//! `ndchunk_filesystem`.
//!
//! ## Licence
//! `ndchunk_storage` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.

mod storage_sync;
pub mod store;
mod store_key;
mod store_prefix;

#[cfg(any(test, feature = "tests"))]
/// Store test utilities (for store conformance tests).
pub mod store_test;

use std::sync::Arc;

use thiserror::Error;

pub use store_key::{StoreKey, StoreKeyError, StoreKeys};
pub use store_prefix::{StorePrefix, StorePrefixError};

pub use self::storage_sync::{
    ListableStorageTraits, ReadableStorageTraits, ReadableWritableListableStorageTraits,
    WritableStorageTraits,
};

/// [`Arc`] wrapped readable, writable, and listable storage.
pub type ReadableWritableListableStorage = Arc<dyn ReadableWritableListableStorageTraits>;

/// The type for bytes used in store set and get methods.
///
/// An alias for [`bytes::Bytes`].
pub type Bytes = bytes::Bytes;

/// An alias for bytes which may or may not be available.
///
/// When a value is read from a store, it returns `MaybeBytes` which is [`None`] if the key is not available.
pub type MaybeBytes = Option<Bytes>;

/// A storage error.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A write operation was attempted on a read only store.
    #[error("a write operation was attempted on a read only store")]
    ReadOnly,
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] Arc<std::io::Error>),
    /// An invalid store prefix.
    #[error("invalid store prefix {0}")]
    StorePrefixError(#[from] StorePrefixError),
    /// An invalid store key.
    #[error("invalid store key {0}")]
    InvalidStoreKey(#[from] StoreKeyError),
    /// A store is corrupt.
    #[error("corrupt store: {0}")]
    Corrupt(String),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::IOError(Arc::new(err))
    }
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}
