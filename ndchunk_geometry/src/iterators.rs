//! Array subset iterators.
//!
//! [`Indices`] iterates over the multidimensional indices of the elements in a region.
//! It is created with [`ArraySubset::indices`](crate::ArraySubset::indices).

mod indices_iterator;

pub use indices_iterator::{Indices, IndicesIntoIterator, IndicesIterator};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArraySubset;

    #[test]
    fn array_subset_iter_indices() {
        let subset = ArraySubset::new_with_ranges(&[1..3, 1..3]);
        let indices = subset.indices();
        assert_eq!(indices.len(), 4);
        let mut iter = indices.into_iter();
        assert_eq!(iter.next().unwrap().as_slice(), &[1, 1]);
        assert_eq!(iter.next().unwrap().as_slice(), &[1, 2]);
        assert_eq!(iter.next().unwrap().as_slice(), &[2, 1]);
        assert_eq!(iter.next().unwrap().as_slice(), &[2, 2]);
        assert!(iter.next().is_none());
    }
}
