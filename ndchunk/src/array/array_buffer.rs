use ndchunk_geometry::{ArraySubset, DimensionError, TransferPlan};

use super::{allocate_staging, Array, ArrayContext, ArrayError, ShapeMismatchError};

impl Array {
    /// Create an array from a dense row-major `buffer`.
    ///
    /// Chunks are gathered, compressed, and stored in row-major chunk order.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - the length of `buffer` is not the size of the array in bytes,
    ///  - the store cannot be created, or
    ///  - a chunk cannot be staged, compressed, or stored.
    ///
    /// A partially written persistent array is removed on failure.
    pub fn from_buffer(ctx: &ArrayContext, buffer: &[u8]) -> Result<Self, ArrayError> {
        check_buffer_size(buffer.len(), ctx.geometry().nbytes())?;
        let array = Self::create(ctx, ctx.metalayers().clone())?;
        match array.store_buffer(buffer) {
            Ok(()) => Ok(array),
            Err(err) => {
                array.discard();
                Err(err)
            }
        }
    }

    /// Create an array with no stored chunks, which reads as zeros.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the store cannot be created.
    pub fn zeros(ctx: &ArrayContext) -> Result<Self, ArrayError> {
        Self::create(ctx, ctx.metalayers().clone())
    }

    /// Create an array with no stored chunks.
    ///
    /// The contents are unspecified until written, and currently read as zeros.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the store cannot be created.
    pub fn empty(ctx: &ArrayContext) -> Result<Self, ArrayError> {
        Self::create(ctx, ctx.metalayers().clone())
    }

    /// Create an array with every element set to `fill_value`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the length of `fill_value` is not the element size, or the
    /// store cannot be created or written.
    pub fn full(ctx: &ArrayContext, fill_value: &[u8]) -> Result<Self, ArrayError> {
        check_buffer_size(fill_value.len(), ctx.geometry().typesize())?;
        let array = Self::create(ctx, ctx.metalayers().clone())?;
        match array.store_fill_value(fill_value) {
            Ok(()) => Ok(array),
            Err(err) => {
                array.discard();
                Err(err)
            }
        }
    }

    /// Gather, compress, and store every chunk from a dense buffer of the whole array.
    pub(crate) fn store_buffer(&self, buffer: &[u8]) -> Result<(), ArrayError> {
        let region = ArraySubset::new_with_shape(self.shape());
        let mut staging = allocate_staging(self.geometry.ext_chunk_nbytes())?;
        for chunk_indices in &self.geometry.chunk_grid_subset().indices() {
            staging.fill(0);
            self.gather_chunk(&chunk_indices, buffer, &region, &mut staging)?;
            self.store_chunk(self.geometry.chunk_linear_index(&chunk_indices)?, &staging)?;
        }
        Ok(())
    }

    fn store_fill_value(&self, fill_value: &[u8]) -> Result<(), ArrayError> {
        let block_shape = self.block_shape();
        let block_nbytes = self.geometry.block_nbytes();
        let filled_block = fill_value.repeat(block_nbytes / self.typesize());
        let origin = vec![0; self.ndim()];
        let mut staging = allocate_staging(self.geometry.ext_chunk_nbytes())?;
        for chunk_indices in &self.geometry.chunk_grid_subset().indices() {
            staging.fill(0);
            for block in self.geometry.block_regions(&chunk_indices)? {
                let plan = TransferPlan::new(
                    block_shape,
                    &ArraySubset::new_with_shape(block.subset.shape()),
                    block_shape,
                    &origin,
                    self.typesize(),
                )?;
                plan.apply(
                    &filled_block,
                    &mut staging[block.offset_bytes..block.offset_bytes + block_nbytes],
                )?;
            }
            self.store_chunk(self.geometry.chunk_linear_index(&chunk_indices)?, &staging)?;
        }
        Ok(())
    }

    /// Copy the part of `src_region` (held densely in `src`) within a chunk into its staging area.
    fn gather_chunk(
        &self,
        chunk_indices: &[u64],
        src: &[u8],
        src_region: &ArraySubset,
        staging: &mut [u8],
    ) -> Result<(), ArrayError> {
        let block_nbytes = self.geometry.block_nbytes();
        for block in self
            .geometry
            .block_regions_intersecting(chunk_indices, src_region)?
        {
            let overlap = block.subset.overlap(src_region)?;
            let plan = TransferPlan::new(
                src_region.shape(),
                &overlap.relative_to(src_region.start())?,
                self.block_shape(),
                overlap.relative_to(block.subset.start())?.start(),
                self.typesize(),
            )?;
            plan.apply(
                src,
                &mut staging[block.offset_bytes..block.offset_bytes + block_nbytes],
            )?;
        }
        Ok(())
    }

    /// Copy the part of a staged chunk within `dst_region` into `dst`, which holds the region
    /// densely.
    fn scatter_chunk(
        &self,
        chunk_indices: &[u64],
        staging: &[u8],
        dst: &mut [u8],
        dst_region: &ArraySubset,
    ) -> Result<(), ArrayError> {
        let block_nbytes = self.geometry.block_nbytes();
        for block in self
            .geometry
            .block_regions_intersecting(chunk_indices, dst_region)?
        {
            let overlap = block.subset.overlap(dst_region)?;
            let plan = TransferPlan::new(
                self.block_shape(),
                &overlap.relative_to(block.subset.start())?,
                dst_region.shape(),
                overlap.relative_to(dst_region.start())?.start(),
                self.typesize(),
            )?;
            plan.apply(
                &staging[block.offset_bytes..block.offset_bytes + block_nbytes],
                dst,
            )?;
        }
        Ok(())
    }

    /// Decompress the array into a dense row-major `buffer`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the length of `buffer` is not the size of the array in bytes,
    /// or a chunk cannot be read or decompressed.
    pub fn to_buffer(&self, buffer: &mut [u8]) -> Result<(), ArrayError> {
        check_buffer_size(buffer.len(), self.nbytes())?;
        let region = ArraySubset::new_with_shape(self.shape());
        for chunk_indices in &self.geometry.chunk_grid_subset().indices() {
            let staging =
                self.retrieve_chunk(self.geometry.chunk_linear_index(&chunk_indices)?)?;
            self.scatter_chunk(&chunk_indices, &staging, buffer, &region)?;
        }
        Ok(())
    }

    /// Decompress the array into a new dense row-major buffer.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the buffer cannot be allocated, or a chunk cannot be read or
    /// decompressed.
    pub fn to_vec(&self) -> Result<Vec<u8>, ArrayError> {
        let mut buffer = allocate_staging(self.nbytes())?;
        self.to_buffer(&mut buffer)?;
        Ok(buffer)
    }

    /// Return the region from `start` (inclusive) to `stop` (exclusive), and its size in bytes.
    fn slice_region(
        &self,
        start: &[u64],
        stop: &[u64],
    ) -> Result<(ArraySubset, usize), ArrayError> {
        for len in [start.len(), stop.len()] {
            if len != self.ndim() {
                return Err(DimensionError::IncompatibleDimensionality {
                    got: len,
                    expected: self.ndim(),
                }
                .into());
            }
        }
        if std::iter::zip(start, stop).any(|(start, stop)| start > stop) {
            return Err(DimensionError::OutOfBounds {
                indices: start.to_vec(),
                shape: stop.to_vec(),
            }
            .into());
        }
        let region = ArraySubset::new_with_start_end_exc(start, stop)?;
        if !region.inbounds_shape(self.shape()) {
            return Err(DimensionError::OutOfBounds {
                indices: stop.to_vec(),
                shape: self.shape().to_vec(),
            }
            .into());
        }
        let nbytes = usize::try_from(region.num_elements())
            .ok()
            .and_then(|n| n.checked_mul(self.typesize()))
            .ok_or_else(|| DimensionError::Overflow(region.shape().to_vec()))?;
        Ok((region, nbytes))
    }

    /// Decompress the region from `start` (inclusive) to `stop` (exclusive) into a dense
    /// row-major `buffer`.
    ///
    /// Only the chunks overlapping the region are decompressed.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the region is invalid or out of bounds, the length of `buffer`
    /// does not match the region, or a chunk cannot be read or decompressed.
    pub fn get_slice_buffer(
        &self,
        start: &[u64],
        stop: &[u64],
        buffer: &mut [u8],
    ) -> Result<(), ArrayError> {
        let (region, nbytes) = self.slice_region(start, stop)?;
        check_buffer_size(buffer.len(), nbytes)?;
        for chunk_indices in &self.geometry.chunks_intersecting(&region)?.indices() {
            let staging =
                self.retrieve_chunk(self.geometry.chunk_linear_index(&chunk_indices)?)?;
            self.scatter_chunk(&chunk_indices, &staging, buffer, &region)?;
        }
        Ok(())
    }

    /// Decompress the region from `start` (inclusive) to `stop` (exclusive) into a new buffer.
    ///
    /// # Errors
    /// See [`get_slice_buffer`](Self::get_slice_buffer).
    pub fn get_slice_vec(&self, start: &[u64], stop: &[u64]) -> Result<Vec<u8>, ArrayError> {
        let (_, nbytes) = self.slice_region(start, stop)?;
        let mut buffer = allocate_staging(nbytes)?;
        self.get_slice_buffer(start, stop, &mut buffer)?;
        Ok(buffer)
    }

    /// Write a dense row-major `buffer` to the region from `start` (inclusive) to `stop`
    /// (exclusive).
    ///
    /// Every chunk overlapping the region is recompressed. Chunks only partly covered by the
    /// region are decompressed first.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the region is invalid or out of bounds, the length of `buffer`
    /// does not match the region, or a chunk cannot be read, written, or recompressed.
    pub fn set_slice_buffer(
        &mut self,
        buffer: &[u8],
        start: &[u64],
        stop: &[u64],
    ) -> Result<(), ArrayError> {
        let (region, nbytes) = self.slice_region(start, stop)?;
        check_buffer_size(buffer.len(), nbytes)?;
        for chunk_indices in &self.geometry.chunks_intersecting(&region)?.indices() {
            let chunk_index = self.geometry.chunk_linear_index(&chunk_indices)?;
            let chunk_subset = self.geometry.chunk_subset(&chunk_indices)?;
            let mut staging = if region.overlap(&chunk_subset)? == chunk_subset {
                allocate_staging(self.geometry.ext_chunk_nbytes())?
            } else {
                self.retrieve_chunk(chunk_index)?
            };
            self.gather_chunk(&chunk_indices, buffer, &region, &mut staging)?;
            self.store_chunk(chunk_index, &staging)?;
        }
        Ok(())
    }
}

fn check_buffer_size(got: usize, expected: usize) -> Result<(), ShapeMismatchError> {
    if got == expected {
        Ok(())
    } else {
        Err(ShapeMismatchError::BufferSize { got, expected })
    }
}
