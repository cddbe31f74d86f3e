use auto_impl::auto_impl;

use super::{Bytes, MaybeBytes, StorageError, StoreKey, StoreKeys, StorePrefix};

/// Readable storage traits.
#[auto_impl(Arc)]
pub trait ReadableStorageTraits: Send + Sync {
    /// Retrieve the value (bytes) associated with a given [`StoreKey`].
    ///
    /// Returns [`None`] if the key is not found.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError>;
}

/// Listable storage traits.
#[auto_impl(Arc)]
pub trait ListableStorageTraits: Send + Sync {
    /// Retrieve all [`StoreKeys`] with a given [`StorePrefix`].
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying error with the store.
    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError>;
}

/// Writable storage traits.
#[auto_impl(Arc)]
pub trait WritableStorageTraits: Send + Sync {
    /// Store bytes at a [`StoreKey`].
    ///
    /// # Errors
    /// Returns a [`StorageError`] on failure to store.
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError>;

    /// Erase a [`StoreKey`].
    ///
    /// Succeeds if the key does not exist.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn erase(&self, key: &StoreKey) -> Result<(), StorageError>;

    /// Flush pending writes to the underlying medium.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the flush fails.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// A supertrait of [`ReadableStorageTraits`], [`WritableStorageTraits`], and [`ListableStorageTraits`].
///
/// An array holds its store as an [`Arc`](std::sync::Arc) of this trait.
pub trait ReadableWritableListableStorageTraits:
    ReadableStorageTraits + WritableStorageTraits + ListableStorageTraits
{
}

impl<T> ReadableWritableListableStorageTraits for T where
    T: ReadableStorageTraits + WritableStorageTraits + ListableStorageTraits + 'static
{
}
