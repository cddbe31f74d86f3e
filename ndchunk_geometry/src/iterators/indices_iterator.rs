use std::iter::FusedIterator;

use crate::{unravel_index, ArraySubset, Dims};

/// An iterator over the indices in an array subset.
///
/// Iterates over the last dimension fastest (i.e. C-contiguous order).
/// For example, consider a 4x3 array with element indices
/// ```text
/// (0, 0)  (0, 1)  (0, 2)
/// (1, 0)  (1, 1)  (1, 2)
/// (2, 0)  (2, 1)  (2, 2)
/// (3, 0)  (3, 1)  (3, 2)
/// ```
/// An iterator with an array subset corresponding to the lower right 2x2 region will produce `[(2, 1), (2, 2), (3, 1), (3, 2)]`.
#[derive(Clone)]
pub struct Indices {
    subset: ArraySubset,
    range: std::ops::Range<u64>,
}

impl Indices {
    /// Create a new indices struct.
    #[must_use]
    pub fn new(subset: ArraySubset) -> Self {
        let length = subset.num_elements();
        Self {
            subset,
            range: 0..length,
        }
    }

    /// Return the number of indices.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.range.end.saturating_sub(self.range.start)
    }

    /// Returns true if the number of indices is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a new serial iterator.
    #[must_use]
    pub fn iter(&self) -> IndicesIterator<'_> {
        <&Self as IntoIterator>::into_iter(self)
    }
}

impl<'a> IntoIterator for &'a Indices {
    type Item = Dims;
    type IntoIter = IndicesIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        IndicesIterator {
            subset: &self.subset,
            range: self.range.clone(),
        }
    }
}

impl IntoIterator for Indices {
    type Item = Dims;
    type IntoIter = IndicesIntoIterator;

    fn into_iter(self) -> Self::IntoIter {
        IndicesIntoIterator {
            subset: self.subset,
            range: self.range,
        }
    }
}

/// Serial indices iterator.
///
/// See [`Indices`].
#[derive(Clone)]
pub struct IndicesIterator<'a> {
    subset: &'a ArraySubset,
    range: std::ops::Range<u64>,
}

/// Serial indices iterator.
///
/// See [`Indices`].
#[derive(Clone)]
pub struct IndicesIntoIterator {
    subset: ArraySubset,
    range: std::ops::Range<u64>,
}

/// Compute indices from a linear index within a subset, adding the subset start offset.
#[inline]
fn subset_indices(index: u64, subset: &ArraySubset) -> Option<Dims> {
    let mut indices = unravel_index(index, subset.shape())?;
    std::iter::zip(indices.iter_mut(), subset.start()).for_each(|(idx, st)| *idx += st);
    Some(indices)
}

macro_rules! impl_indices_iterator {
    ($iterator_type:ty) => {
        impl Iterator for $iterator_type {
            type Item = Dims;

            fn next(&mut self) -> Option<Self::Item> {
                if self.range.start >= self.range.end {
                    return None;
                }
                let index = self.range.start;
                self.range.start += 1;
                subset_indices(index, &self.subset)
            }

            fn size_hint(&self) -> (usize, Option<usize>) {
                let length = self.range.end.saturating_sub(self.range.start);
                let length = usize::try_from(length).unwrap_or(usize::MAX);
                (length, Some(length))
            }
        }

        impl DoubleEndedIterator for $iterator_type {
            fn next_back(&mut self) -> Option<Self::Item> {
                if self.range.end > self.range.start {
                    self.range.end -= 1;
                    subset_indices(self.range.end, &self.subset)
                } else {
                    None
                }
            }
        }

        impl ExactSizeIterator for $iterator_type {}

        impl FusedIterator for $iterator_type {}
    };
}

impl_indices_iterator!(IndicesIterator<'_>);
impl_indices_iterator!(IndicesIntoIterator);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_iterator_double_ended() {
        let indices = Indices::new(ArraySubset::new_with_ranges(&[1..3, 5..7]));
        assert_eq!(indices.len(), 4);
        let mut iter = indices.iter();
        assert_eq!(iter.next().unwrap().as_slice(), &[1, 5]);
        assert_eq!(iter.next_back().unwrap().as_slice(), &[2, 6]);
        assert_eq!(iter.next().unwrap().as_slice(), &[1, 6]);
        assert_eq!(iter.len(), 1);
        assert_eq!(iter.next().unwrap().as_slice(), &[2, 5]);
        assert!(iter.next().is_none());
        assert_eq!(indices.into_iter().map(|v| v[0] + v[1]).sum::<u64>(), 30);
    }

    #[test]
    fn indices_iterator_empty() {
        let indices = Indices::new(ArraySubset::new_with_ranges(&[1..3, 5..5]));
        assert_eq!(indices.len(), 0);
        assert!(indices.is_empty());
        assert!(indices.iter().next().is_none());
    }
}
