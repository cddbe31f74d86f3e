use std::collections::TryReserveError;

use ndchunk_filesystem::FilesystemStoreCreateError;
use ndchunk_geometry::{ArraySubsetError, DimensionError};
use ndchunk_storage::StorageError;
use thiserror::Error;

use crate::codec::CodecError;
use crate::metadata::MetadataError;

/// Array errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArrayError {
    /// An invalid geometry or out of bounds region.
    #[error(transparent)]
    Dimension(#[from] DimensionError),
    /// A buffer or array does not have the expected size or shape.
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),
    /// A staging buffer could not be allocated.
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    /// A store, codec, or persisted layout error.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// A metadata error.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl From<ArraySubsetError> for ArrayError {
    fn from(err: ArraySubsetError) -> Self {
        Self::Dimension(err.into())
    }
}

impl From<StorageError> for ArrayError {
    fn from(err: StorageError) -> Self {
        Self::Backend(err.into())
    }
}

impl From<CodecError> for ArrayError {
    fn from(err: CodecError) -> Self {
        Self::Backend(err.into())
    }
}

impl From<FilesystemStoreCreateError> for ArrayError {
    fn from(err: FilesystemStoreCreateError) -> Self {
        Self::Backend(err.into())
    }
}

/// A size or shape mismatch.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ShapeMismatchError {
    /// A buffer has the wrong length.
    #[error("got buffer with size {got}, expected {expected}")]
    BufferSize {
        /// The buffer length.
        got: usize,
        /// The expected length.
        expected: usize,
    },
    /// An array has the wrong shape.
    #[error("got array with shape {got:?}, expected {expected:?}")]
    Shape {
        /// The shape.
        got: Vec<u64>,
        /// The expected shape.
        expected: Vec<u64>,
    },
    /// An array has the wrong element size.
    #[error("got element size {got}, expected {expected}")]
    Typesize {
        /// The element size.
        got: usize,
        /// The expected element size.
        expected: usize,
    },
}

/// A staging buffer allocation failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("failed to allocate a staging buffer of {nbytes} bytes")]
pub struct AllocationError {
    nbytes: usize,
}

impl AllocationError {
    /// Return the size of the failed allocation in bytes.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.nbytes
    }
}

/// Allocate a zeroed staging buffer of `nbytes`, reporting failure instead of aborting.
pub(crate) fn allocate_staging(nbytes: usize) -> Result<Vec<u8>, AllocationError> {
    let mut staging = Vec::new();
    staging
        .try_reserve_exact(nbytes)
        .map_err(|_: TryReserveError| AllocationError { nbytes })?;
    staging.resize(nbytes, 0);
    Ok(staging)
}

/// A storage backend error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// A store error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A codec error.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A persistent store could not be created or opened.
    #[error(transparent)]
    Filesystem(#[from] FilesystemStoreCreateError),
    /// The store has no array header.
    #[error("the store has no array header")]
    MissingHeader,
    /// The array header is invalid.
    #[error("invalid array header: {0}")]
    InvalidHeader(String),
    /// A stored chunk is invalid.
    #[error("chunk {chunk_index} is invalid: {reason}")]
    InvalidChunk {
        /// The linear chunk index.
        chunk_index: u64,
        /// Why the chunk is invalid.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_allocation() {
        assert_eq!(allocate_staging(16).unwrap(), vec![0u8; 16]);
        assert!(allocate_staging(0).unwrap().is_empty());
        let err = allocate_staging(usize::MAX).unwrap_err();
        assert_eq!(err.nbytes(), usize::MAX);
    }

    #[test]
    fn array_error_conversions() {
        let err = ArrayError::from(StorageError::ReadOnly);
        assert!(matches!(
            err,
            ArrayError::Backend(BackendError::Storage(StorageError::ReadOnly))
        ));
        let err = ArrayError::from(CodecError::InvalidEncodedValue);
        assert_eq!(err.to_string(), "blosc encoded value is invalid");
        let err = ArrayError::from(ShapeMismatchError::BufferSize {
            got: 1,
            expected: 2,
        });
        assert_eq!(err.to_string(), "got buffer with size 1, expected 2");
    }
}
