use std::path::Path;

use itertools::Itertools;
use ndchunk_geometry::TransferPlan;

use super::{
    allocate_staging, chunk_cache::ChunkCacheDecodedLru, Array, ArrayContext, ArrayError,
    ShapeMismatchError, StorageConfig,
};
use crate::config::{global_config, CopyStrategy};

impl Array {
    /// Copy `source` into a new array described by `ctx`.
    ///
    /// The chunk shape, block shape, compression parameters, and storage of the copy are taken
    /// from `ctx`, and may all differ from `source`.
    /// The metalayers and variable metadata of `source` are carried over.
    ///
    /// If the geometry and compression parameters match, compressed chunks are copied verbatim.
    /// Otherwise the copy follows the [`CopyStrategy`] of the global configuration.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - the shape or element size of `ctx` differs from `source`,
    ///  - the store cannot be created, or
    ///  - a chunk cannot be read, recompressed, or written.
    ///
    /// A partially written persistent copy is removed on failure.
    pub fn copy(ctx: &ArrayContext, source: &Array) -> Result<Self, ArrayError> {
        let geometry = ctx.geometry();
        if geometry.shape() != source.shape() {
            return Err(ShapeMismatchError::Shape {
                got: geometry.shape().to_vec(),
                expected: source.shape().to_vec(),
            }
            .into());
        }
        if geometry.typesize() != source.typesize() {
            return Err(ShapeMismatchError::Typesize {
                got: geometry.typesize(),
                expected: source.typesize(),
            }
            .into());
        }
        let mut array = Self::create(ctx, source.metalayers.clone())?;
        match array.copy_from(source) {
            Ok(()) => Ok(array),
            Err(err) => {
                array.discard();
                Err(err)
            }
        }
    }

    /// Save the array to a new persistent store at `path`.
    ///
    /// The saved array keeps the geometry and compression parameters, so its chunks are copied
    /// verbatim.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `path` already exists or the array cannot be copied.
    pub fn save<P: AsRef<Path>>(&self, path: P, contiguous: bool) -> Result<Self, ArrayError> {
        let storage = if contiguous {
            StorageConfig::contiguous(path, self.compression.clone())
        } else {
            StorageConfig::directory(path, self.compression.clone())
        };
        let ctx = ArrayContext::new(
            storage,
            self.shape(),
            self.chunk_shape(),
            self.block_shape(),
            self.metalayers.clone(),
        )?;
        Self::copy(&ctx, self)
    }

    fn copy_from(&mut self, source: &Array) -> Result<(), ArrayError> {
        if self.geometry == source.geometry && self.compression.is_equivalent(&source.compression) {
            self.copy_verbatim(source)?;
        } else {
            let copy_strategy = global_config().copy_strategy();
            match copy_strategy {
                CopyStrategy::Chunkwise => {
                    let capacity = global_config().chunk_cache_capacity();
                    let misses = self.copy_chunkwise(source, capacity)?;
                    log::debug!(
                        "chunkwise copy of {} chunks decompressed {misses} source chunks",
                        self.geometry.num_chunks()
                    );
                }
                CopyStrategy::Dense => self.store_buffer(&source.to_vec()?)?,
            }
        }

        if !source.vlmeta.is_empty() {
            self.store_vlmeta(source.vlmeta.clone())?;
        }
        Ok(())
    }

    /// Copy the stored compressed chunks of `source`, which has the same geometry.
    fn copy_verbatim(&self, source: &Array) -> Result<(), ArrayError> {
        let mut copied = 0;
        for chunk_index in 0..source.geometry.num_chunks() {
            if let Some(encoded) = source.retrieve_chunk_encoded(chunk_index)? {
                self.store_chunk_encoded(chunk_index, encoded)?;
                copied += 1;
            }
        }
        log::debug!("copied {copied} compressed chunks verbatim");
        Ok(())
    }

    /// Build every chunk from the overlapping blocks of the decompressed chunks of `source`.
    ///
    /// Returns the number of source chunks decompressed.
    fn copy_chunkwise(&self, source: &Array, cache_capacity: usize) -> Result<usize, ArrayError> {
        let mut cache = ChunkCacheDecodedLru::new(cache_capacity);
        let typesize = self.typesize();
        let dst_block_nbytes = self.geometry.block_nbytes();
        let src_block_nbytes = source.geometry.block_nbytes();
        let mut staging = allocate_staging(self.geometry.ext_chunk_nbytes())?;
        for chunk_indices in &self.geometry.chunk_grid_subset().indices() {
            staging.fill(0);
            let chunk_subset = self.geometry.chunk_subset(&chunk_indices)?;
            let src_chunks = source.geometry.chunks_intersecting(&chunk_subset)?;
            for src_chunk_indices in &src_chunks.indices() {
                let src_chunk_index = source.geometry.chunk_linear_index(&src_chunk_indices)?;
                let src_chunk = cache.retrieve_chunk(src_chunk_index, || {
                    source.retrieve_chunk(src_chunk_index)
                })?;
                let src_chunk_subset = source.geometry.chunk_subset(&src_chunk_indices)?;
                let dst_blocks = self
                    .geometry
                    .block_regions_intersecting(&chunk_indices, &src_chunk_subset)?;
                let src_blocks = source
                    .geometry
                    .block_regions_intersecting(&src_chunk_indices, &chunk_subset)?;
                for (dst_block, src_block) in dst_blocks.iter().cartesian_product(&src_blocks) {
                    let overlap = dst_block.subset.overlap(&src_block.subset)?;
                    if overlap.is_empty() {
                        continue;
                    }
                    let plan = TransferPlan::new(
                        source.block_shape(),
                        &overlap.relative_to(src_block.subset.start())?,
                        self.block_shape(),
                        overlap.relative_to(dst_block.subset.start())?.start(),
                        typesize,
                    )?;
                    plan.apply(
                        &src_chunk
                            [src_block.offset_bytes..src_block.offset_bytes + src_block_nbytes],
                        &mut staging
                            [dst_block.offset_bytes..dst_block.offset_bytes + dst_block_nbytes],
                    )?;
                }
            }
            self.store_chunk(self.geometry.chunk_linear_index(&chunk_indices)?, &staging)?;
        }
        Ok(cache.misses())
    }
}

#[cfg(test)]
mod tests {
    use ndchunk_storage::Bytes;

    use super::*;
    use crate::array::BackendError;
    use crate::codec::{BloscCompressor, CompressionParams};
    use crate::config::global_config_mut;
    use crate::metadata::Metalayers;

    fn ctx(chunk_shape: &[u64], block_shape: &[u64], params: CompressionParams) -> ArrayContext {
        ArrayContext::new(
            StorageConfig::memory(params),
            &[30, 30],
            chunk_shape,
            block_shape,
            Metalayers::from_pairs([("random", 8.34f64.to_ne_bytes())]).unwrap(),
        )
        .unwrap()
    }

    fn source() -> (Array, Vec<u8>) {
        let data: Vec<u8> = (0..900u16).flat_map(u16::to_ne_bytes).collect();
        let ctx = ctx(&[20, 20], &[10, 10], CompressionParams::new(2));
        let mut array = Array::from_buffer(&ctx, &data).unwrap();
        array.set_variable("units", b"metres").unwrap();
        (array, data)
    }

    #[test]
    fn array_copy_chunkwise_cache() {
        let (source, data) = source();
        let dest = Array::zeros(&ctx(&[10, 10], &[5, 5], CompressionParams::new(2))).unwrap();
        // each source chunk covers whole destination chunks
        assert_eq!(dest.copy_chunkwise(&source, 4).unwrap(), 4);
        assert_eq!(dest.to_vec().unwrap(), data);

        // destination chunks straddle source chunks
        let dest = Array::zeros(&ctx(&[15, 15], &[5, 5], CompressionParams::new(2))).unwrap();
        assert_eq!(dest.copy_chunkwise(&source, 4).unwrap(), 4);
        assert_eq!(dest.to_vec().unwrap(), data);
        let dest = Array::zeros(&ctx(&[15, 15], &[5, 5], CompressionParams::new(2))).unwrap();
        assert_eq!(dest.copy_chunkwise(&source, 1).unwrap(), 8);
        assert_eq!(dest.to_vec().unwrap(), data);
    }

    #[test]
    #[serial_test::serial]
    fn array_copy() {
        let (source, data) = source();
        let params = CompressionParams::new(2).with_compressor(BloscCompressor::Zstd);
        for copy_strategy in [CopyStrategy::Chunkwise, CopyStrategy::Dense] {
            global_config_mut().set_copy_strategy(copy_strategy);
            let dest = Array::copy(&ctx(&[10, 10], &[5, 5], params.clone()), &source).unwrap();
            assert_eq!(dest.to_vec().unwrap(), data);
            assert_eq!(dest.chunk_shape(), &[10, 10]);
            assert_eq!(dest.compression().compressor(), BloscCompressor::Zstd);
            assert_eq!(dest.get_fixed("random").unwrap(), 8.34f64.to_ne_bytes());
            assert_eq!(dest.get_variable("units").unwrap(), b"metres");
            assert_eq!(dest.num_stored_chunks().unwrap(), 9);
        }
        global_config_mut().set_copy_strategy(CopyStrategy::default());
    }

    #[test]
    fn array_copy_verbatim() {
        let (source, data) = source();
        let dest = Array::copy(
            &ctx(&[20, 20], &[10, 10], CompressionParams::new(2).with_nthreads(2)),
            &source,
        )
        .unwrap();
        assert_eq!(dest.to_vec().unwrap(), data);
        for chunk_index in 0..4 {
            assert_eq!(
                dest.retrieve_chunk_encoded(chunk_index).unwrap(),
                source.retrieve_chunk_encoded(chunk_index).unwrap()
            );
        }
    }

    #[test]
    fn array_copy_mismatch() {
        let (source, _) = source();
        let wide_ctx = ArrayContext::new(
            StorageConfig::memory(CompressionParams::new(2)),
            &[30, 31],
            &[10, 10],
            &[5, 5],
            Metalayers::new(),
        )
        .unwrap();
        assert!(matches!(
            Array::copy(&wide_ctx, &source),
            Err(ArrayError::ShapeMismatch(ShapeMismatchError::Shape { .. }))
        ));
        assert!(matches!(
            Array::copy(&ctx(&[10, 10], &[5, 5], CompressionParams::new(4)), &source),
            Err(ArrayError::ShapeMismatch(ShapeMismatchError::Typesize {
                got: 4,
                expected: 2
            }))
        ));
    }

    #[test]
    fn array_copy_failure_removes_destination() {
        let (source, _) = source();
        source
            .store_chunk_encoded(3, Bytes::from_static(b"garbage"))
            .unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("copy.ndc");
        let storages = [
            StorageConfig::contiguous(&path, CompressionParams::new(2)),
            StorageConfig::directory(dir.path().join("copy"), CompressionParams::new(2)),
        ];
        for storage in storages {
            let path = storage.urlpath().unwrap().to_path_buf();
            let ctx = ArrayContext::new(
                storage,
                &[30, 30],
                &[10, 10],
                &[5, 5],
                Metalayers::new(),
            )
            .unwrap();
            assert!(matches!(
                Array::copy(&ctx, &source),
                Err(ArrayError::Backend(BackendError::InvalidChunk {
                    chunk_index: 3,
                    ..
                }))
            ));
            assert!(!path.exists());
        }
    }

    #[test]
    fn array_save() {
        let (source, data) = source();
        let dir = tempfile::TempDir::new().unwrap();
        for (name, contiguous) in [("array.ndc", true), ("array", false)] {
            let path = dir.path().join(name);
            let saved = source.save(&path, contiguous).unwrap();
            assert_eq!(saved.is_contiguous(), contiguous);
            saved.free().unwrap();

            let opened = Array::open(&path).unwrap();
            assert_eq!(opened.is_contiguous(), contiguous);
            assert_eq!(opened.to_vec().unwrap(), data);
            assert_eq!(opened.get_variable("units").unwrap(), b"metres");
            assert!(source.save(&path, contiguous).is_err());
        }
    }
}
