//! Array subsets.
//!
//! An [`ArraySubset`] represents a rectangular region of an array, a chunk, or a chunk grid.

use std::fmt::{Debug, Display};
use std::ops::Range;

use itertools::izip;
use thiserror::Error;

use crate::iterators::Indices;
use crate::{Dims, MAX_DIM};

/// An array subset error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ArraySubsetError {
    /// Incompatible dimensionality.
    #[error("incompatible dimensionality {got}, expected {expected}")]
    IncompatibleDimensionality { got: usize, expected: usize },
    /// Incompatible start and shape.
    #[error("incompatible start {start:?} with shape {shape:?}")]
    IncompatibleStartShape { start: Vec<u64>, shape: Vec<u64> },
    /// Incompatible offset.
    #[error("incompatible offset {offset:?} for region with start {start:?}")]
    IncompatibleOffset { start: Vec<u64>, offset: Vec<u64> },
    /// Out of bounds.
    #[error("subset with end {end:?} is out of bounds of shape {shape:?}")]
    OutOfBounds { end: Vec<u64>, shape: Vec<u64> },
}

/// An array subset.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct ArraySubset {
    /// The start of the array subset.
    pub(crate) start: Dims,
    /// The shape of the array subset.
    pub(crate) shape: Dims,
}

impl Display for ArraySubset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_ranges().fmt(f)
    }
}

impl ArraySubset {
    /// Create a new empty array subset.
    ///
    /// # Panics
    /// Panics if `dimensionality` exceeds [`MAX_DIM`].
    #[must_use]
    pub fn new_empty(dimensionality: usize) -> Self {
        assert!(dimensionality <= MAX_DIM);
        let mut start = Dims::new();
        start.set_len(dimensionality);
        Self {
            shape: start.clone(),
            start,
        }
    }

    /// Create a new array subset from a list of [`Range`]s.
    ///
    /// # Panics
    /// Panics if there are more than [`MAX_DIM`] ranges.
    #[must_use]
    pub fn new_with_ranges(ranges: &[Range<u64>]) -> Self {
        let start = ranges.iter().map(|range| range.start).collect();
        let shape = ranges
            .iter()
            .map(|range| range.end.saturating_sub(range.start))
            .collect();
        Self { start, shape }
    }

    /// Create a new array subset with `shape` starting at the origin.
    ///
    /// # Panics
    /// Panics if `shape` has more than [`MAX_DIM`] elements.
    #[must_use]
    pub fn new_with_shape(shape: &[u64]) -> Self {
        let mut start = Dims::new();
        start.set_len(shape.len());
        Self {
            start,
            shape: shape.iter().copied().collect(),
        }
    }

    /// Create a new array subset.
    ///
    /// # Errors
    /// Returns [`ArraySubsetError`] if the lengths of `start` and `shape` do not match or exceed [`MAX_DIM`].
    pub fn new_with_start_shape(start: &[u64], shape: &[u64]) -> Result<Self, ArraySubsetError> {
        if start.len() == shape.len() && start.len() <= MAX_DIM {
            Ok(Self {
                start: start.iter().copied().collect(),
                shape: shape.iter().copied().collect(),
            })
        } else {
            Err(ArraySubsetError::IncompatibleStartShape {
                start: start.to_vec(),
                shape: shape.to_vec(),
            })
        }
    }

    /// Create a new array subset from a start and end (exclusive).
    ///
    /// Components of `end` less than `start` produce an empty axis.
    ///
    /// # Errors
    /// Returns [`ArraySubsetError`] if `start` and `end` differ in length or exceed [`MAX_DIM`].
    pub fn new_with_start_end_exc(start: &[u64], end: &[u64]) -> Result<Self, ArraySubsetError> {
        if start.len() != end.len() || start.len() > MAX_DIM {
            return Err(ArraySubsetError::IncompatibleDimensionality {
                got: end.len(),
                expected: start.len(),
            });
        }
        Ok(Self {
            start: start.iter().copied().collect(),
            shape: std::iter::zip(start, end)
                .map(|(&start, &end)| end.saturating_sub(start))
                .collect(),
        })
    }

    /// Return the start of the array subset.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// Return the shape of the array subset.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the dimensionality of the array subset.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// Returns if the array subset is empty (i.e. has a zero element in its shape).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shape.iter().any(|i| i == &0)
    }

    /// Return the number of elements of the array subset.
    ///
    /// Equal to the product of the components of its shape.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Returns the end (exclusive).
    #[must_use]
    pub fn end_exc(&self) -> Dims {
        std::iter::zip(self.start.iter(), self.shape.iter())
            .map(|(&s, &l)| s + l)
            .collect()
    }

    /// Converts to ranges.
    #[must_use]
    pub fn to_ranges(&self) -> Vec<Range<u64>> {
        std::iter::zip(self.start.iter(), self.shape.iter())
            .map(|(&start, &size)| start..start + size)
            .collect()
    }

    /// Returns true if the subset contains the given indices.
    #[must_use]
    pub fn contains(&self, indices: &[u64]) -> bool {
        indices.len() == self.dimensionality()
            && izip!(indices, self.start.iter(), self.shape.iter())
                .all(|(&i, &o, &s)| i >= o && i < o + s)
    }

    /// Returns true if the subset is within the bounds of an array with the given shape.
    #[must_use]
    pub fn inbounds_shape(&self, array_shape: &[u64]) -> bool {
        self.dimensionality() == array_shape.len()
            && izip!(self.start.iter(), self.shape.iter(), array_shape)
                .all(|(&start, &size, &bound)| start + size <= bound)
    }

    /// Return the overlapping subset between this subset and `other`.
    ///
    /// The overlap is empty (but still positioned) if the subsets are disjoint.
    ///
    /// # Errors
    /// Returns [`ArraySubsetError`] if the dimensionality of `other` does not match.
    pub fn overlap(&self, other: &ArraySubset) -> Result<ArraySubset, ArraySubsetError> {
        if other.dimensionality() != self.dimensionality() {
            return Err(ArraySubsetError::IncompatibleDimensionality {
                got: other.dimensionality(),
                expected: self.dimensionality(),
            });
        }
        let mut start = Dims::new();
        let mut shape = Dims::new();
        for (&s, &l, &os, &ol) in izip!(
            self.start.iter(),
            self.shape.iter(),
            other.start.iter(),
            other.shape.iter()
        ) {
            let overlap_start = std::cmp::max(s, os);
            let overlap_end = std::cmp::min(s + l, os + ol);
            start.push(overlap_start);
            shape.push(overlap_end.saturating_sub(overlap_start));
        }
        Ok(Self { start, shape })
    }

    /// Return the subset relative to `offset`.
    ///
    /// Creates an array subset starting at `self.start() - offset`.
    ///
    /// # Errors
    /// Returns [`ArraySubsetError`] if the length of `offset` does not match the dimensionality
    /// or any component of `offset` exceeds the start.
    pub fn relative_to(&self, offset: &[u64]) -> Result<ArraySubset, ArraySubsetError> {
        if offset.len() != self.dimensionality()
            || std::iter::zip(self.start.iter(), offset).any(|(&start, &offset)| start < offset)
        {
            Err(ArraySubsetError::IncompatibleOffset {
                start: self.start.to_vec(),
                offset: offset.to_vec(),
            })
        } else {
            Ok(Self {
                start: std::iter::zip(self.start.iter(), offset)
                    .map(|(&start, &offset)| start - offset)
                    .collect(),
                shape: self.shape.clone(),
            })
        }
    }

    /// Returns an iterator over the indices of elements within the subset.
    #[must_use]
    pub fn indices(&self) -> Indices {
        Indices::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_subset() {
        assert!(ArraySubset::new_with_start_shape(&[0, 0], &[10, 10]).is_ok());
        assert!(ArraySubset::new_with_start_shape(&[0, 0], &[10]).is_err());
        assert!(ArraySubset::new_with_start_end_exc(&[0, 0], &[10, 10]).is_ok());
        assert!(ArraySubset::new_with_start_end_exc(&[0, 0], &[10]).is_err());
        assert_eq!(
            ArraySubset::new_with_start_end_exc(&[5, 5], &[0, 7])
                .unwrap()
                .shape(),
            &[0, 2]
        );

        let array_subset0 = ArraySubset::new_with_ranges(&[1..5, 2..6]);
        let array_subset1 = ArraySubset::new_with_ranges(&[3..6, 4..7]);
        assert_eq!(
            array_subset0.overlap(&array_subset1).unwrap(),
            ArraySubset::new_with_ranges(&[3..5, 4..6])
        );
        assert!(array_subset0
            .overlap(&ArraySubset::new_with_ranges(&[6..8, 0..1]))
            .unwrap()
            .is_empty());
        assert_eq!(
            array_subset0.relative_to(&[1, 1]).unwrap(),
            ArraySubset::new_with_ranges(&[0..4, 1..5])
        );
        assert!(array_subset0.relative_to(&[1, 1, 1]).is_err());
        assert!(array_subset0.relative_to(&[2, 0]).is_err());
        assert!(array_subset0.inbounds_shape(&[10, 10]));
        assert!(!array_subset0.inbounds_shape(&[2, 2]));
        assert!(!array_subset0.inbounds_shape(&[10, 10, 10]));
        assert!(array_subset0.contains(&[1, 5]));
        assert!(!array_subset0.contains(&[5, 5]));
        assert_eq!(array_subset0.to_ranges(), vec![1..5, 2..6]);
        assert_eq!(array_subset0.end_exc().as_slice(), &[5, 6]);
        assert_eq!(array_subset0.num_elements(), 16);
        assert_eq!(array_subset0.to_string(), "[1..5, 2..6]");

        let array_subset2 = ArraySubset::new_with_ranges(&[3..6, 4..7, 0..1]);
        assert!(array_subset0.overlap(&array_subset2).is_err());
    }

    #[test]
    fn array_subset_empty() {
        let empty = ArraySubset::new_empty(3);
        assert!(empty.is_empty());
        assert_eq!(empty.num_elements(), 0);
        assert_eq!(empty.dimensionality(), 3);
        assert!(ArraySubset::new_with_shape(&[4, 0]).is_empty());
    }
}
