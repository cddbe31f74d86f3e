use itertools::izip;

use crate::{
    ravel_indices, to_dims, unravel_index, ArraySubset, DimensionError, Dims, MAX_DIM,
};

/// The chunk and block partition of an N-dimensional array.
///
/// The array `shape` is covered by a grid of chunks of `chunk_shape`, and each chunk by a grid of
/// blocks of `block_shape`. A chunk padded out to whole blocks has the *extended chunk shape*.
///
/// Chunks on the upper boundary of an axis are clipped to the array, and blocks are clipped to
/// their (possibly clipped) chunk. A block entirely in the padding of a clipped chunk has a zero
/// extent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Geometry {
    shape: Dims,
    chunk_shape: Dims,
    block_shape: Dims,
    typesize: usize,
    grid_shape: Dims,
    blocks_per_chunk: Dims,
    ext_chunk_shape: Dims,
    block_nbytes: usize,
    ext_chunk_nbytes: usize,
}

/// A block within a chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRegion {
    /// The indices of the block within the block grid of its chunk.
    pub block_indices: Dims,
    /// The global array subset covered by the block, clipped to the array.
    pub subset: ArraySubset,
    /// The byte offset of the block within the decompressed chunk.
    pub offset_bytes: usize,
}

fn nbytes(shape: &[u64], typesize: usize) -> Result<usize, DimensionError> {
    shape
        .iter()
        .try_fold(1u64, |acc, &dim| acc.checked_mul(dim))
        .and_then(|n| n.checked_mul(typesize as u64))
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| DimensionError::Overflow(shape.to_vec()))
}

impl Geometry {
    /// Create and validate a new geometry.
    ///
    /// # Errors
    /// Returns a [`DimensionError`] if
    ///  - the dimensionality is not within `1..=MAX_DIM` or the shapes differ in length,
    ///  - any chunk shape component is zero on an axis of nonzero length,
    ///  - any block shape component is zero on an axis of nonzero length, or exceeds the chunk shape
    ///    of an array with elements,
    ///  - `typesize` is zero, or
    ///  - the array or chunk size in bytes overflows.
    pub fn new(
        shape: &[u64],
        chunk_shape: &[u64],
        block_shape: &[u64],
        typesize: usize,
    ) -> Result<Self, DimensionError> {
        let ndim = shape.len();
        if ndim == 0 || ndim > MAX_DIM {
            return Err(DimensionError::InvalidDimensionality(ndim));
        }
        for len in [chunk_shape.len(), block_shape.len()] {
            if len != ndim {
                return Err(DimensionError::IncompatibleDimensionality {
                    got: len,
                    expected: ndim,
                });
            }
        }
        // a zero-length axis may declare a zero chunk and block length
        if std::iter::zip(shape, chunk_shape).any(|(&s, &c)| c == 0 && s != 0) {
            return Err(DimensionError::InvalidChunkShape(chunk_shape.to_vec()));
        }
        // an array without elements has no blocks to fit within its chunks
        let has_elements = !shape.contains(&0);
        if izip!(shape, block_shape, chunk_shape)
            .any(|(&s, &b, &c)| (b == 0 && s != 0) || (b > c && has_elements))
        {
            return Err(DimensionError::InvalidBlockShape {
                block_shape: block_shape.to_vec(),
                chunk_shape: chunk_shape.to_vec(),
            });
        }
        if typesize == 0 {
            return Err(DimensionError::InvalidTypesize);
        }

        let grid_shape = std::iter::zip(shape, chunk_shape)
            .map(|(&s, &c)| if s == 0 { 0 } else { s.div_ceil(c) })
            .collect::<Dims>();
        let blocks_per_chunk = std::iter::zip(chunk_shape, block_shape)
            .map(|(&c, &b)| if b == 0 { 0 } else { c.div_ceil(b) })
            .collect::<Dims>();
        let ext_chunk_shape = std::iter::zip(&blocks_per_chunk, block_shape)
            .map(|(&n, &b)| n * b)
            .collect::<Dims>();

        nbytes(shape, typesize)?;
        let block_nbytes = nbytes(block_shape, typesize)?;
        let ext_chunk_nbytes = nbytes(&ext_chunk_shape, typesize)?;

        Ok(Self {
            shape: to_dims(shape)?,
            chunk_shape: to_dims(chunk_shape)?,
            block_shape: to_dims(block_shape)?,
            typesize,
            grid_shape,
            blocks_per_chunk,
            ext_chunk_shape,
            block_nbytes,
            ext_chunk_nbytes,
        })
    }

    /// Return the dimensionality.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Return the array shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the nominal chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    /// Return the nominal block shape.
    #[must_use]
    pub fn block_shape(&self) -> &[u64] {
        &self.block_shape
    }

    /// Return the element size in bytes.
    #[must_use]
    pub fn typesize(&self) -> usize {
        self.typesize
    }

    /// Return the number of chunks along each axis.
    ///
    /// An axis of zero length has zero chunks.
    #[must_use]
    pub fn grid_shape(&self) -> &[u64] {
        &self.grid_shape
    }

    /// Return the number of blocks along each axis of a chunk.
    #[must_use]
    pub fn blocks_per_chunk(&self) -> &[u64] {
        &self.blocks_per_chunk
    }

    /// Return the chunk shape padded to whole blocks.
    #[must_use]
    pub fn ext_chunk_shape(&self) -> &[u64] {
        &self.ext_chunk_shape
    }

    /// Return the number of elements in the array.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Return the size of the array in bytes.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        // validated on construction
        usize::try_from(self.num_elements()).unwrap_or(usize::MAX) * self.typesize
    }

    /// Return the number of chunks in the array.
    #[must_use]
    pub fn num_chunks(&self) -> u64 {
        self.grid_shape.iter().product()
    }

    /// Return the number of blocks in a chunk.
    #[must_use]
    pub fn num_blocks_per_chunk(&self) -> u64 {
        self.blocks_per_chunk.iter().product()
    }

    /// Return the size of a block in bytes.
    #[must_use]
    pub fn block_nbytes(&self) -> usize {
        self.block_nbytes
    }

    /// Return the size of a decompressed (extended) chunk in bytes.
    #[must_use]
    pub fn ext_chunk_nbytes(&self) -> usize {
        self.ext_chunk_nbytes
    }

    /// Return the subset of the chunk grid covering every chunk.
    #[must_use]
    pub fn chunk_grid_subset(&self) -> ArraySubset {
        ArraySubset::new_with_shape(&self.grid_shape)
    }

    /// Return the chunk indices of the chunk with linear index `chunk_index`.
    ///
    /// # Errors
    /// Returns [`DimensionError::OutOfBounds`] if `chunk_index` is not less than [`num_chunks`](Self::num_chunks).
    pub fn chunk_indices(&self, chunk_index: u64) -> Result<Dims, DimensionError> {
        unravel_index(chunk_index, &self.grid_shape).ok_or_else(|| DimensionError::OutOfBounds {
            indices: vec![chunk_index],
            shape: vec![self.num_chunks()],
        })
    }

    /// Return the linear index of the chunk at `chunk_indices`.
    ///
    /// # Errors
    /// Returns [`DimensionError::OutOfBounds`] if `chunk_indices` are outside the chunk grid.
    pub fn chunk_linear_index(&self, chunk_indices: &[u64]) -> Result<u64, DimensionError> {
        ravel_indices(chunk_indices, &self.grid_shape).ok_or_else(|| {
            DimensionError::OutOfBounds {
                indices: chunk_indices.to_vec(),
                shape: self.grid_shape.to_vec(),
            }
        })
    }

    fn check_chunk_indices(&self, chunk_indices: &[u64]) -> Result<(), DimensionError> {
        self.chunk_linear_index(chunk_indices).map(|_| ())
    }

    /// Return the global subset of the chunk at `chunk_indices`, clipped to the array.
    ///
    /// # Errors
    /// Returns [`DimensionError::OutOfBounds`] if `chunk_indices` are outside the chunk grid.
    pub fn chunk_subset(&self, chunk_indices: &[u64]) -> Result<ArraySubset, DimensionError> {
        self.check_chunk_indices(chunk_indices)?;
        let mut start = Dims::new();
        let mut shape = Dims::new();
        for (&i, &c, &s) in izip!(chunk_indices, &self.chunk_shape, &self.shape) {
            let offset = i * c;
            start.push(offset);
            shape.push(std::cmp::min(c, s - offset));
        }
        Ok(ArraySubset { start, shape })
    }

    /// Return the actual (clipped) extent of the chunk at `chunk_indices`.
    ///
    /// # Errors
    /// Returns [`DimensionError::OutOfBounds`] if `chunk_indices` are outside the chunk grid.
    pub fn chunk_extent(&self, chunk_indices: &[u64]) -> Result<Dims, DimensionError> {
        Ok(self.chunk_subset(chunk_indices)?.shape)
    }

    /// Return the global subset of block `block_indices` in the chunk at `chunk_indices`.
    ///
    /// The block is clipped to its chunk and may have a zero extent.
    ///
    /// # Errors
    /// Returns [`DimensionError::OutOfBounds`] if the chunk or block indices are out of bounds.
    pub fn block_subset(
        &self,
        chunk_indices: &[u64],
        block_indices: &[u64],
    ) -> Result<ArraySubset, DimensionError> {
        let chunk_subset = self.chunk_subset(chunk_indices)?;
        self.block_subset_in(&chunk_subset, block_indices)
    }

    /// Return the actual (clipped) extent of block `block_indices` in the chunk at `chunk_indices`.
    ///
    /// # Errors
    /// Returns [`DimensionError::OutOfBounds`] if the chunk or block indices are out of bounds.
    pub fn block_extent(
        &self,
        chunk_indices: &[u64],
        block_indices: &[u64],
    ) -> Result<Dims, DimensionError> {
        Ok(self.block_subset(chunk_indices, block_indices)?.shape)
    }

    fn block_subset_in(
        &self,
        chunk_subset: &ArraySubset,
        block_indices: &[u64],
    ) -> Result<ArraySubset, DimensionError> {
        if ravel_indices(block_indices, &self.blocks_per_chunk).is_none() {
            return Err(DimensionError::OutOfBounds {
                indices: block_indices.to_vec(),
                shape: self.blocks_per_chunk.to_vec(),
            });
        }
        let chunk_end = chunk_subset.end_exc();
        let mut start = Dims::new();
        let mut shape = Dims::new();
        for (&i, &b, &chunk_start, &chunk_end) in izip!(
            block_indices,
            &self.block_shape,
            chunk_subset.start(),
            &chunk_end
        ) {
            let offset = chunk_start + i * b;
            start.push(offset);
            shape.push(std::cmp::min(b, chunk_end.saturating_sub(offset)));
        }
        Ok(ArraySubset { start, shape })
    }

    /// Return every block of the chunk at `chunk_indices` in row-major block order.
    ///
    /// # Errors
    /// Returns [`DimensionError::OutOfBounds`] if `chunk_indices` are outside the chunk grid.
    pub fn block_regions(&self, chunk_indices: &[u64]) -> Result<Vec<BlockRegion>, DimensionError> {
        let chunk_subset = self.chunk_subset(chunk_indices)?;
        ArraySubset::new_with_shape(&self.blocks_per_chunk)
            .indices()
            .into_iter()
            .enumerate()
            .map(|(block_index, block_indices)| {
                let subset = self.block_subset_in(&chunk_subset, &block_indices)?;
                Ok(BlockRegion {
                    block_indices,
                    subset,
                    offset_bytes: block_index * self.block_nbytes,
                })
            })
            .collect()
    }

    /// Return the blocks of the chunk at `chunk_indices` which overlap `region`.
    ///
    /// Blocks with a zero extent never overlap.
    ///
    /// # Errors
    /// Returns a [`DimensionError`] if `chunk_indices` are outside the chunk grid or `region`
    /// has a different dimensionality.
    pub fn block_regions_intersecting(
        &self,
        chunk_indices: &[u64],
        region: &ArraySubset,
    ) -> Result<Vec<BlockRegion>, DimensionError> {
        let mut regions = Vec::new();
        for block in self.block_regions(chunk_indices)? {
            if !block.subset.overlap(region)?.is_empty() {
                regions.push(block);
            }
        }
        Ok(regions)
    }

    /// Return the subset of the chunk grid with chunks overlapping `region`.
    ///
    /// # Errors
    /// Returns [`DimensionError::OutOfBounds`] if `region` is not within the array.
    pub fn chunks_intersecting(&self, region: &ArraySubset) -> Result<ArraySubset, DimensionError> {
        if !region.inbounds_shape(&self.shape) {
            return Err(DimensionError::OutOfBounds {
                indices: region.end_exc().to_vec(),
                shape: self.shape.to_vec(),
            });
        }
        if region.is_empty() {
            return Ok(ArraySubset::new_empty(self.ndim()));
        }
        let mut start = Dims::new();
        let mut shape = Dims::new();
        for (&region_start, &region_size, &c) in
            izip!(region.start(), region.shape(), &self.chunk_shape)
        {
            let first = region_start / c;
            let last = (region_start + region_size - 1) / c;
            start.push(first);
            shape.push(last - first + 1);
        }
        Ok(ArraySubset { start, shape })
    }
}
