use itertools::izip;

use crate::{row_major_strides, ArraySubset, DimensionError, Dims};

/// A contiguous run of bytes copied by a [`TransferPlan`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransferRun {
    /// The byte offset in the source buffer.
    pub src_offset: usize,
    /// The byte offset in the destination buffer.
    pub dst_offset: usize,
    /// The number of bytes.
    pub len: usize,
}

/// The movement of a rectangular region between two dense row-major buffers.
///
/// The region is `src_subset` of a source buffer with `src_shape`, and lands at `dst_start` of a
/// destination buffer with `dst_shape`. Runs are ordered row-major over the region. The innermost
/// run covers the last axis of the region and is merged across further axes while the region
/// spans every inner axis completely in both buffers.
///
/// Gathering a region into a staging buffer and scattering it back out are the same operation
/// with the source and destination roles swapped.
#[derive(Clone, Debug, Default)]
pub struct TransferPlan {
    runs: Vec<TransferRun>,
    src_extent: usize,
    dst_extent: usize,
}

fn to_usize(value: u64, shape: &[u64]) -> Result<usize, DimensionError> {
    usize::try_from(value).map_err(|_| DimensionError::Overflow(shape.to_vec()))
}

impl TransferPlan {
    /// Plan the transfer of `src_subset` of a `src_shape` buffer to `dst_start` of a `dst_shape` buffer.
    ///
    /// # Errors
    /// Returns a [`DimensionError`] if the dimensionalities differ, or the region is out of bounds of
    /// either buffer.
    pub fn new(
        src_shape: &[u64],
        src_subset: &ArraySubset,
        dst_shape: &[u64],
        dst_start: &[u64],
        typesize: usize,
    ) -> Result<Self, DimensionError> {
        let ndim = src_subset.dimensionality();
        for len in [src_shape.len(), dst_shape.len(), dst_start.len()] {
            if len != ndim {
                return Err(DimensionError::IncompatibleDimensionality {
                    got: len,
                    expected: ndim,
                });
            }
        }
        if !src_subset.inbounds_shape(src_shape) {
            return Err(DimensionError::OutOfBounds {
                indices: src_subset.end_exc().to_vec(),
                shape: src_shape.to_vec(),
            });
        }
        let dst_subset = ArraySubset::new_with_start_shape(dst_start, src_subset.shape())?;
        if !dst_subset.inbounds_shape(dst_shape) {
            return Err(DimensionError::OutOfBounds {
                indices: dst_subset.end_exc().to_vec(),
                shape: dst_shape.to_vec(),
            });
        }
        if src_subset.is_empty() {
            return Ok(Self::default());
        }

        // Merge axes from the innermost outwards while both buffers are spanned completely
        let mut contiguous = true;
        let mut contiguous_elements = 1;
        let mut outer_shape = Dims::new();
        outer_shape.set_len(ndim);
        for (&src_start, &size, &src_size, &dst_start, &dst_size, outer) in izip!(
            src_subset.start().iter().rev(),
            src_subset.shape().iter().rev(),
            src_shape.iter().rev(),
            dst_start.iter().rev(),
            dst_shape.iter().rev(),
            outer_shape.iter_mut().rev(),
        ) {
            if contiguous {
                contiguous_elements *= size;
                *outer = 1;
                contiguous =
                    src_start == 0 && size == src_size && dst_start == 0 && size == dst_size;
            } else {
                *outer = size;
            }
        }

        let src_strides = row_major_strides(src_shape);
        let dst_strides = row_major_strides(dst_shape);
        let typesize_u64 = typesize as u64;
        let len = to_usize(contiguous_elements * typesize_u64, src_shape)?;
        let outer = ArraySubset::new_with_shape(&outer_shape);
        let mut runs = Vec::with_capacity(to_usize(outer.num_elements(), src_shape)?);
        for relative in &outer.indices() {
            let mut src_offset = 0;
            let mut dst_offset = 0;
            for (&r, &src_start, &src_stride, &dst_start, &dst_stride) in izip!(
                &relative,
                src_subset.start(),
                &src_strides,
                dst_start,
                &dst_strides
            ) {
                src_offset += (src_start + r) * src_stride;
                dst_offset += (dst_start + r) * dst_stride;
            }
            runs.push(TransferRun {
                src_offset: to_usize(src_offset * typesize_u64, src_shape)?,
                dst_offset: to_usize(dst_offset * typesize_u64, dst_shape)?,
                len,
            });
        }

        let (src_extent, dst_extent) = runs.last().map_or((0, 0), |run| {
            (run.src_offset + run.len, run.dst_offset + run.len)
        });
        Ok(Self {
            runs,
            src_extent,
            dst_extent,
        })
    }

    /// Return the runs of the transfer.
    #[must_use]
    pub fn runs(&self) -> &[TransferRun] {
        &self.runs
    }

    /// Return the number of runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Returns true if the transfer moves no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Return the total number of bytes moved.
    #[must_use]
    pub fn num_bytes(&self) -> usize {
        self.runs.iter().map(|run| run.len).sum()
    }

    /// Copy every run from `src` to `dst`.
    ///
    /// # Errors
    /// Returns [`DimensionError::BufferTooSmall`] if either buffer is too small for the plan.
    pub fn apply(&self, src: &[u8], dst: &mut [u8]) -> Result<(), DimensionError> {
        if src.len() < self.src_extent {
            return Err(DimensionError::BufferTooSmall {
                got: src.len(),
                expected: self.src_extent,
            });
        }
        if dst.len() < self.dst_extent {
            return Err(DimensionError::BufferTooSmall {
                got: dst.len(),
                expected: self.dst_extent,
            });
        }
        for run in &self.runs {
            dst[run.dst_offset..run.dst_offset + run.len]
                .copy_from_slice(&src[run.src_offset..run.src_offset + run.len]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_plan_rows() {
        // 2x2 region of a 4x4 u8 buffer to the origin of a 2x3 buffer
        let subset = ArraySubset::new_with_ranges(&[1..3, 1..3]);
        let plan = TransferPlan::new(&[4, 4], &subset, &[2, 3], &[0, 1], 1).unwrap();
        assert_eq!(
            plan.runs(),
            &[
                TransferRun {
                    src_offset: 5,
                    dst_offset: 1,
                    len: 2
                },
                TransferRun {
                    src_offset: 9,
                    dst_offset: 4,
                    len: 2
                },
            ]
        );
        let src: Vec<u8> = (0..16).collect();
        let mut dst = vec![0u8; 6];
        plan.apply(&src, &mut dst).unwrap();
        assert_eq!(dst, vec![0, 5, 6, 0, 9, 10]);
    }

    #[test]
    fn transfer_plan_merged() {
        // full rows in both buffers merge into a single run
        let subset = ArraySubset::new_with_ranges(&[1..3, 0..4]);
        let plan = TransferPlan::new(&[4, 4], &subset, &[2, 4], &[0, 0], 2).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan.runs()[0],
            TransferRun {
                src_offset: 8,
                dst_offset: 0,
                len: 16
            }
        );

        // full rows in the source only do not merge
        let plan = TransferPlan::new(&[4, 4], &subset, &[2, 5], &[0, 0], 2).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.runs()[1].dst_offset, 10);
        assert_eq!(plan.num_bytes(), 16);
    }

    #[test]
    fn transfer_plan_3d() {
        let shape = [3, 4, 5];
        let subset = ArraySubset::new_with_ranges(&[1..3, 1..4, 2..5]);
        let plan = TransferPlan::new(&shape, &subset, &[2, 3, 3], &[0, 0, 0], 4).unwrap();
        assert_eq!(plan.len(), 6);
        assert_eq!(plan.num_bytes(), 2 * 3 * 3 * 4);

        let src: Vec<u8> = (0..60u32).flat_map(u32::to_ne_bytes).collect();
        let mut dst = vec![0u8; 2 * 3 * 3 * 4];
        plan.apply(&src, &mut dst).unwrap();
        let dst: Vec<u32> = dst
            .chunks_exact(4)
            .map(|b| u32::from_ne_bytes(b.try_into().unwrap()))
            .collect();
        let expected: Vec<u32> = subset
            .indices()
            .into_iter()
            .map(|i| u32::try_from(i[0] * 20 + i[1] * 5 + i[2]).unwrap())
            .collect();
        assert_eq!(dst, expected);
    }

    #[test]
    fn transfer_plan_invalid() {
        let subset = ArraySubset::new_with_ranges(&[1..3, 1..3]);
        assert!(TransferPlan::new(&[2, 2], &subset, &[2, 2], &[0, 0], 1).is_err());
        assert!(TransferPlan::new(&[4, 4], &subset, &[2, 2], &[1, 0], 1).is_err());
        assert!(TransferPlan::new(&[4, 4], &subset, &[2, 2, 2], &[0, 0], 1).is_err());

        let plan = TransferPlan::new(&[4, 4], &subset, &[2, 2], &[0, 0], 1).unwrap();
        assert!(matches!(
            plan.apply(&[0u8; 8], &mut [0u8; 4]),
            Err(DimensionError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn transfer_plan_empty() {
        let subset = ArraySubset::new_with_ranges(&[1..1, 1..3]);
        let plan = TransferPlan::new(&[4, 4], &subset, &[2, 2], &[0, 0], 1).unwrap();
        assert!(plan.is_empty());
        plan.apply(&[], &mut []).unwrap();
    }
}
