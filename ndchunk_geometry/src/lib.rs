//! The chunk and block geometry model for the `ndchunk` crate.
//!
//! An N-dimensional array of `shape` is partitioned into a regular grid of chunks of
//! `chunk_shape`, and every chunk is further partitioned into a regular grid of blocks of
//! `block_shape`. Chunks and blocks at the upper boundary of an axis are clipped to the array
//! extent. A [`Geometry`] holds the validated partition and answers questions about it.
//!
//! A [`TransferPlan`] describes how the elements of a rectangular region move between two
//! dense row-major buffers of different shape, as a list of contiguous byte runs.
//!
//! ## Licence
//! `ndchunk_geometry` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.

mod array_subset;
pub use array_subset::{ArraySubset, ArraySubsetError};

mod geometry;
pub use geometry::{BlockRegion, Geometry};

mod transfer;
pub use transfer::{TransferPlan, TransferRun};

pub mod iterators;

use thiserror::Error;

/// The maximum dimensionality of an array.
pub const MAX_DIM: usize = 8;

/// Per-axis values (a shape or ND indices) stored inline.
pub type Dims = tinyvec::ArrayVec<[u64; MAX_DIM]>;

/// A geometry error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DimensionError {
    /// The dimensionality is outside of `1..=MAX_DIM`.
    #[error("invalid dimensionality {0}, must be between 1 and {MAX_DIM}")]
    InvalidDimensionality(usize),
    /// Per-axis sequences have differing lengths.
    #[error("incompatible dimensionality {got}, expected {expected}")]
    IncompatibleDimensionality {
        /// The dimensionality received.
        got: usize,
        /// The dimensionality expected.
        expected: usize,
    },
    /// A chunk shape component is zero.
    #[error("chunk shape {0:?} has a zero component")]
    InvalidChunkShape(Vec<u64>),
    /// A block shape component is zero or exceeds the chunk shape.
    #[error("block shape {block_shape:?} is incompatible with chunk shape {chunk_shape:?}")]
    InvalidBlockShape {
        /// The block shape.
        block_shape: Vec<u64>,
        /// The chunk shape.
        chunk_shape: Vec<u64>,
    },
    /// The element size is zero.
    #[error("typesize must be greater than zero")]
    InvalidTypesize,
    /// Indices are out of bounds.
    #[error("indices {indices:?} are out of bounds of {shape:?}")]
    OutOfBounds {
        /// The indices.
        indices: Vec<u64>,
        /// The bounding shape.
        shape: Vec<u64>,
    },
    /// A size does not fit in the address space.
    #[error("size overflow computing the number of bytes of {0:?}")]
    Overflow(Vec<u64>),
    /// A buffer is smaller than a transfer requires.
    #[error("buffer of {got} bytes is smaller than the {expected} bytes required")]
    BufferTooSmall {
        /// The buffer length.
        got: usize,
        /// The required length.
        expected: usize,
    },
    /// An array subset error.
    #[error(transparent)]
    ArraySubset(#[from] ArraySubsetError),
}

/// Convert a slice into [`Dims`].
///
/// # Errors
/// Returns [`DimensionError::InvalidDimensionality`] if `values` has more than [`MAX_DIM`] elements.
pub fn to_dims(values: &[u64]) -> Result<Dims, DimensionError> {
    if values.len() > MAX_DIM {
        return Err(DimensionError::InvalidDimensionality(values.len()));
    }
    let mut dims = Dims::new();
    dims.extend_from_slice(values);
    Ok(dims)
}

/// Ravel ND indices to a linearised index (row-major, last axis fastest).
///
/// Returns [`None`] if any `indices` are out-of-bounds of `shape` or the dimensionality differs.
#[must_use]
pub fn ravel_indices(indices: &[u64], shape: &[u64]) -> Option<u64> {
    if indices.len() != shape.len() {
        return None;
    }
    let mut index: u64 = 0;
    let mut count = 1;
    for (i, s) in std::iter::zip(indices, shape).rev() {
        if i >= s {
            return None;
        }
        index += i * count;
        count *= s;
    }
    Some(index)
}

/// Unravel a linearised index to ND indices (row-major, last axis fastest).
///
/// Returns [`None`] if `index` is out-of-bounds of `shape`.
#[must_use]
pub fn unravel_index(mut index: u64, shape: &[u64]) -> Option<Dims> {
    if shape.len() > MAX_DIM {
        return None;
    }
    let total_size: u64 = shape
        .iter()
        .try_fold(1u64, |acc, &dim| acc.checked_mul(dim))?;
    if index >= total_size {
        return None;
    }
    let mut indices = Dims::new();
    indices.set_len(shape.len());
    for (indices_i, &dim) in std::iter::zip(indices.iter_mut().rev(), shape.iter().rev()) {
        *indices_i = index % dim;
        index /= dim;
    }
    Some(indices)
}

/// Row-major strides (in elements) of an array with `shape`.
pub(crate) fn row_major_strides(shape: &[u64]) -> Dims {
    let mut strides = Dims::new();
    strides.set_len(shape.len());
    let mut stride = 1;
    for (stride_i, &dim) in std::iter::zip(strides.iter_mut().rev(), shape.iter().rev()) {
        *stride_i = stride;
        stride *= dim;
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ravel_unravel() {
        assert_eq!(ravel_indices(&[1, 2], &[3, 4]), Some(6));
        assert_eq!(ravel_indices(&[3, 0], &[3, 4]), None);
        assert_eq!(ravel_indices(&[1], &[3, 4]), None);
        assert_eq!(unravel_index(6, &[3, 4]).unwrap().as_slice(), &[1, 2]);
        assert_eq!(unravel_index(12, &[3, 4]), None);
        assert_eq!(unravel_index(0, &[3, 0, 4]), None);
        assert_eq!(
            unravel_index(23, &[2, 3, 4]).unwrap().as_slice(),
            &[1, 2, 3]
        );

        let shape = [2, 1, 3, 1, 2, 2];
        for i in 0..shape.iter().product::<u64>() {
            let indices = unravel_index(i, &shape).unwrap();
            assert_eq!(ravel_indices(&indices, &shape), Some(i));
        }
    }

    #[test]
    fn dims() {
        assert_eq!(to_dims(&[1, 2, 3]).unwrap().as_slice(), &[1, 2, 3]);
        assert_eq!(
            to_dims(&[1; 9]),
            Err(DimensionError::InvalidDimensionality(9))
        );
        assert_eq!(row_major_strides(&[2, 3, 4]).as_slice(), &[12, 4, 1]);
    }
}
