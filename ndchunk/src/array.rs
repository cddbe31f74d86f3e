//! Chunked, blocked, and compressed N-dimensional arrays.
//!
//! An [`Array`] partitions an N-dimensional array of fixed-size elements into a regular grid of
//! chunks, and each chunk into a regular grid of blocks (see [`Geometry`]).
//! Every chunk is compressed into a single blosc buffer stored under the key `chunks/<index>`,
//! where `<index>` is the row-major linear index of the chunk in the chunk grid.
//!
//! Arrays are built from an [`ArrayContext`], which fixes the geometry, the [`StorageConfig`],
//! and the initial [`Metalayers`]:
//!  - [`Array::from_buffer`] materializes a dense row-major buffer,
//!  - [`Array::zeros`], [`Array::empty`], and [`Array::full`] create arrays without a buffer,
//!  - [`Array::copy`] re-partitions and re-hosts an existing array, and
//!  - [`Array::open`] reopens a persistent array.
//!
//! ```rust
//! # use ndchunk::array::{Array, ArrayContext, StorageConfig};
//! # use ndchunk::codec::CompressionParams;
//! # use ndchunk::metadata::Metalayers;
//! let ctx = ArrayContext::new(
//!     StorageConfig::memory(CompressionParams::new(4)),
//!     &[30, 30],
//!     &[20, 20],
//!     &[10, 10],
//!     Metalayers::new(),
//! )?;
//! let data: Vec<u8> = (0..900u32).flat_map(u32::to_ne_bytes).collect();
//! let array = Array::from_buffer(&ctx, &data)?;
//! assert_eq!(array.to_vec()?, data);
//!
//! let ctx = ArrayContext::new(
//!     StorageConfig::memory(CompressionParams::new(4)),
//!     &[30, 30],
//!     &[10, 10],
//!     &[5, 5],
//!     Metalayers::new(),
//! )?;
//! let rechunked = Array::copy(&ctx, &array)?;
//! assert_eq!(rechunked.to_vec()?, data);
//! # Ok::<(), ndchunk::array::ArrayError>(())
//! ```

mod array_buffer;
mod array_context;
mod array_copy;
mod array_errors;
mod chunk_cache;

pub use array_context::{ArrayContext, StorageConfig};
pub use array_errors::{AllocationError, ArrayError, BackendError, ShapeMismatchError};

use std::fmt::{Debug, Display};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndchunk_filesystem::{check_path_available, remove_path, ContiguousFileStore, FilesystemStore};
use ndchunk_geometry::Geometry;
use ndchunk_storage::{
    store::MemoryStore, Bytes, ListableStorageTraits, ReadableStorageTraits,
    ReadableWritableListableStorage, StorageError, StoreKey, StorePrefix, WritableStorageTraits,
};

use crate::codec::{BloscCodec, CompressionEngine, CompressionParams};
use crate::metadata::{
    ArrayHeader, MetadataError, Metalayers, VariableMetadata, HEADER_KEY, VLMETA_KEY,
};
use array_errors::allocate_staging;

/// The store key of the chunk with linear index `chunk_index`.
fn chunk_key(chunk_index: u64) -> Result<StoreKey, StorageError> {
    Ok(StoreKey::new(format!("chunks/{chunk_index}"))?)
}

fn metadata_key(key: &str) -> Result<StoreKey, StorageError> {
    Ok(StoreKey::new(key)?)
}

/// A chunked, blocked, and compressed N-dimensional array.
///
/// An array exclusively owns a handle to its store. Mutating methods take `&mut self`, so an array
/// is driven by one thread at a time.
pub struct Array {
    geometry: Geometry,
    compression: CompressionParams,
    codec: BloscCodec,
    metalayers: Metalayers,
    vlmeta: VariableMetadata,
    storage: ReadableWritableListableStorage,
    urlpath: Option<PathBuf>,
    contiguous: bool,
    _engine: CompressionEngine,
}

impl Array {
    /// Create an array with no chunks in a new store described by `ctx`.
    fn create(ctx: &ArrayContext, metalayers: Metalayers) -> Result<Self, ArrayError> {
        let storage_config = ctx.storage();
        let storage: ReadableWritableListableStorage = match storage_config.urlpath() {
            None => Arc::new(MemoryStore::new()),
            Some(path) => {
                check_path_available(path).map_err(BackendError::from)?;
                if storage_config.is_contiguous() {
                    Arc::new(ContiguousFileStore::create(path).map_err(BackendError::from)?)
                } else {
                    Arc::new(FilesystemStore::new(path).map_err(BackendError::from)?)
                }
            }
        };
        let array = Self {
            geometry: ctx.geometry().clone(),
            compression: storage_config.compression().clone(),
            codec: ctx.codec().clone(),
            metalayers,
            vlmeta: VariableMetadata::new(),
            storage,
            urlpath: storage_config.urlpath().map(Path::to_path_buf),
            contiguous: storage_config.is_contiguous(),
            _engine: CompressionEngine::acquire(),
        };
        if let Err(err) = array.store_header() {
            array.discard();
            return Err(err);
        }
        log::debug!(
            "created array with shape {:?}, chunk shape {:?}, block shape {:?} at {:?}",
            array.shape(),
            array.chunk_shape(),
            array.block_shape(),
            array.urlpath
        );
        Ok(array)
    }

    /// Open a persistent array at `path`.
    ///
    /// A file is opened as a contiguous array, and a directory as a sparse array.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `path` does not hold a valid array.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArrayError> {
        let path = path.as_ref();
        let contiguous = path.is_file();
        let storage: ReadableWritableListableStorage = if contiguous {
            Arc::new(ContiguousFileStore::open(path).map_err(BackendError::from)?)
        } else {
            Arc::new(FilesystemStore::open(path).map_err(BackendError::from)?)
        };
        let mut array = Self::open_store(storage)?;
        array.urlpath = Some(path.to_path_buf());
        array.contiguous = contiguous;
        Ok(array)
    }

    /// Open an array held in `storage`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the store has no valid array header or variable metadata.
    pub fn open_store(storage: ReadableWritableListableStorage) -> Result<Self, ArrayError> {
        let header = storage
            .get(&metadata_key(HEADER_KEY)?)?
            .ok_or(BackendError::MissingHeader)?;
        let header = ArrayHeader::from_json(&header)
            .map_err(|err| BackendError::InvalidHeader(err.to_string()))?;
        let geometry = Geometry::new(
            &header.shape,
            &header.chunk_shape,
            &header.block_shape,
            header.typesize,
        )?;
        let codec = BloscCodec::new(&header.compression, geometry.block_nbytes())
            .map_err(BackendError::from)?;
        let vlmeta = match storage.get(&metadata_key(VLMETA_KEY)?)? {
            Some(vlmeta) => serde_json::from_slice(&vlmeta)
                .map_err(|err| MetadataError::Invalid(err.to_string()))?,
            None => VariableMetadata::new(),
        };
        log::debug!(
            "opened array with shape {:?}, chunk shape {:?}, block shape {:?}",
            geometry.shape(),
            geometry.chunk_shape(),
            geometry.block_shape()
        );
        Ok(Self {
            geometry,
            compression: header.compression,
            codec,
            metalayers: header.metalayers,
            vlmeta,
            storage,
            urlpath: None,
            contiguous: false,
            _engine: CompressionEngine::acquire(),
        })
    }

    fn header(&self) -> ArrayHeader {
        ArrayHeader {
            ndim: self.geometry.ndim(),
            shape: self.geometry.shape().to_vec(),
            chunk_shape: self.geometry.chunk_shape().to_vec(),
            block_shape: self.geometry.block_shape().to_vec(),
            typesize: self.geometry.typesize(),
            compression: self.compression.clone(),
            metalayers: self.metalayers.clone(),
        }
    }

    fn store_header(&self) -> Result<(), ArrayError> {
        let header = self.header().to_json()?;
        self.storage
            .set(&metadata_key(HEADER_KEY)?, Bytes::from(header))?;
        Ok(())
    }

    /// Persist `vlmeta`, then make it the variable metadata of the array.
    ///
    /// Empty variable metadata has no record.
    fn store_vlmeta(&mut self, vlmeta: VariableMetadata) -> Result<(), ArrayError> {
        let key = metadata_key(VLMETA_KEY)?;
        if vlmeta.is_empty() {
            self.storage.erase(&key)?;
        } else {
            let encoded = serde_json::to_vec(&vlmeta)
                .map_err(|err| MetadataError::Invalid(err.to_string()))?;
            self.storage.set(&key, Bytes::from(encoded))?;
        }
        self.vlmeta = vlmeta;
        Ok(())
    }

    /// Return the geometry.
    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Return the dimensionality.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.geometry.ndim()
    }

    /// Return the array shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        self.geometry.shape()
    }

    /// Return the chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &[u64] {
        self.geometry.chunk_shape()
    }

    /// Return the block shape.
    #[must_use]
    pub fn block_shape(&self) -> &[u64] {
        self.geometry.block_shape()
    }

    /// Return the element size in bytes.
    #[must_use]
    pub fn typesize(&self) -> usize {
        self.geometry.typesize()
    }

    /// Return the number of elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.geometry.num_elements()
    }

    /// Return the size of the array in bytes.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.geometry.nbytes()
    }

    /// Return the compression parameters.
    #[must_use]
    pub fn compression(&self) -> &CompressionParams {
        &self.compression
    }

    /// Return the path of a persistent array, or [`None`] if the array is in memory.
    #[must_use]
    pub fn urlpath(&self) -> Option<&Path> {
        self.urlpath.as_deref()
    }

    /// Returns true if the array is held in a single file.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        self.contiguous
    }

    /// Return the underlying store.
    #[must_use]
    pub fn storage(&self) -> ReadableWritableListableStorage {
        self.storage.clone()
    }

    /// Return the fixed metalayers.
    #[must_use]
    pub fn metalayers(&self) -> &Metalayers {
        &self.metalayers
    }

    /// Return the variable metadata.
    #[must_use]
    pub fn variable_metadata(&self) -> &VariableMetadata {
        &self.vlmeta
    }

    /// Return the content of the metalayer `name`.
    ///
    /// # Errors
    /// Returns [`MetadataError::NotFound`] if there is no metalayer `name`.
    pub fn get_fixed(&self, name: &str) -> Result<Vec<u8>, ArrayError> {
        Ok(self
            .metalayers
            .get(name)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| MetadataError::NotFound(name.to_string()))?)
    }

    /// Returns true if a metalayer `name` exists.
    #[must_use]
    pub fn exists_fixed(&self, name: &str) -> bool {
        self.metalayers.contains(name)
    }

    /// Return the metalayer names in creation order.
    #[must_use]
    pub fn fixed_names(&self) -> Vec<&str> {
        self.metalayers.names()
    }

    /// Add or overwrite the variable metadata entry `name`.
    ///
    /// The variable metadata is persisted immediately, and left unchanged if the store write fails.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `name` is invalid or the store cannot be written.
    pub fn set_variable(&mut self, name: &str, content: &[u8]) -> Result<(), ArrayError> {
        let mut vlmeta = self.vlmeta.clone();
        vlmeta.set(name, content.to_vec())?;
        self.store_vlmeta(vlmeta)
    }

    /// Return the content of the variable metadata entry `name`.
    ///
    /// # Errors
    /// Returns [`MetadataError::NotFound`] if there is no entry `name`.
    pub fn get_variable(&self, name: &str) -> Result<Vec<u8>, ArrayError> {
        Ok(self
            .vlmeta
            .get(name)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(name.to_string()))?)
    }

    /// Returns true if a variable metadata entry `name` exists.
    #[must_use]
    pub fn exists_variable(&self, name: &str) -> bool {
        self.vlmeta.contains_key(name)
    }

    /// Delete the variable metadata entry `name`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if there is no entry `name` or the store cannot be written.
    pub fn delete_variable(&mut self, name: &str) -> Result<(), ArrayError> {
        let mut vlmeta = self.vlmeta.clone();
        vlmeta.remove(name)?;
        self.store_vlmeta(vlmeta)
    }

    /// Return the variable metadata entry names in lexicographical order.
    #[must_use]
    pub fn variable_names(&self) -> Vec<&str> {
        self.vlmeta.names()
    }

    /// Return the number of chunks with a stored record.
    ///
    /// Chunks without a record read as zeros.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the store cannot be listed.
    pub fn num_stored_chunks(&self) -> Result<usize, ArrayError> {
        let prefix = StorePrefix::new("chunks/").map_err(StorageError::from)?;
        Ok(self.storage.list_prefix(&prefix)?.len())
    }

    /// Return the decompressed chunk with linear index `chunk_index`.
    ///
    /// The chunk holds its blocks in row-major block order, each a dense row-major region of the
    /// block shape. Padding beyond the array extent is zero, as is a chunk with no stored record.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `chunk_index` is out of bounds, the chunk cannot be read, or
    /// the chunk is invalid.
    pub fn retrieve_chunk(&self, chunk_index: u64) -> Result<Vec<u8>, ArrayError> {
        self.geometry.chunk_indices(chunk_index)?;
        let mut staging = allocate_staging(self.geometry.ext_chunk_nbytes())?;
        if let Some(encoded) = self.retrieve_chunk_encoded(chunk_index)? {
            BloscCodec::decompress_into(&encoded, &mut staging, self.compression.nthreads())
                .map_err(|err| BackendError::InvalidChunk {
                    chunk_index,
                    reason: err.to_string(),
                })?;
        }
        Ok(staging)
    }

    pub(crate) fn retrieve_chunk_encoded(
        &self,
        chunk_index: u64,
    ) -> Result<Option<Bytes>, ArrayError> {
        Ok(self.storage.get(&chunk_key(chunk_index)?)?)
    }

    /// Compress and store a decompressed chunk.
    pub(crate) fn store_chunk(&self, chunk_index: u64, staging: &[u8]) -> Result<(), ArrayError> {
        let encoded = self.codec.compress(staging, self.compression.nthreads())?;
        log::trace!(
            "storing chunk {chunk_index}: {} bytes compressed to {}",
            staging.len(),
            encoded.len()
        );
        self.store_chunk_encoded(chunk_index, Bytes::from(encoded))
    }

    pub(crate) fn store_chunk_encoded(
        &self,
        chunk_index: u64,
        encoded: Bytes,
    ) -> Result<(), ArrayError> {
        self.storage.set(&chunk_key(chunk_index)?, encoded)?;
        Ok(())
    }

    /// Release the array, flushing a persistent store.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the store cannot be flushed.
    pub fn free(self) -> Result<(), ArrayError> {
        self.storage.flush()?;
        log::debug!("freed array at {:?}", self.urlpath);
        Ok(())
    }

    /// Release the array and remove a persistent store.
    ///
    /// Used to drop a partially written array.
    fn discard(self) {
        let Self {
            storage, urlpath, ..
        } = self;
        drop(storage);
        if let Some(urlpath) = urlpath {
            if let Err(err) = remove_path(&urlpath) {
                log::warn!("failed to remove {}: {err}", urlpath.display());
            }
        }
    }
}

impl Debug for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Array")
            .field("geometry", &self.geometry)
            .field("compression", &self.compression)
            .field("metalayers", &self.metalayers.names())
            .field("urlpath", &self.urlpath)
            .field("contiguous", &self.contiguous)
            .finish_non_exhaustive()
    }
}

impl Display for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "ndim: {}", self.ndim())?;
        writeln!(f, "shape: {:?}", self.shape())?;
        writeln!(f, "chunk_shape: {:?}", self.chunk_shape())?;
        writeln!(f, "block_shape: {:?}", self.block_shape())?;
        writeln!(f, "typesize: {}", self.typesize())?;
        writeln!(
            f,
            "compression: {} (clevel {}, {})",
            self.compression.compressor(),
            self.compression.clevel(),
            self.compression.shuffle()
        )?;
        write!(f, "metalayers: {:?}", self.metalayers.names())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use ndchunk_storage::{MaybeBytes, StoreKeys};

    use super::*;

    fn memory_ctx(metalayers: Metalayers) -> ArrayContext {
        ArrayContext::new(
            StorageConfig::memory(CompressionParams::new(4)),
            &[30, 30],
            &[20, 20],
            &[10, 10],
            metalayers,
        )
        .unwrap()
    }

    #[test]
    fn array_metadata() {
        let metalayers = Metalayers::from_pairs([("random", 8.34f64.to_ne_bytes())]).unwrap();
        let mut array = Array::zeros(&memory_ctx(metalayers)).unwrap();
        assert!(array.exists_fixed("random"));
        assert_eq!(array.get_fixed("random").unwrap(), 8.34f64.to_ne_bytes());
        assert!(matches!(
            array.get_fixed("missing"),
            Err(ArrayError::Metadata(MetadataError::NotFound(_)))
        ));
        assert_eq!(array.fixed_names(), vec!["random"]);

        array.set_variable("b", &[1, 2]).unwrap();
        array.set_variable("a", &[3]).unwrap();
        array.set_variable("b", &[4]).unwrap();
        assert_eq!(array.get_variable("b").unwrap(), vec![4]);
        assert!(array.exists_variable("a"));
        assert_eq!(array.variable_names(), vec!["a", "b"]);
        array.delete_variable("a").unwrap();
        assert!(!array.exists_variable("a"));
        assert!(matches!(
            array.delete_variable("a"),
            Err(ArrayError::Metadata(MetadataError::NotFound(_)))
        ));
        assert!(array.set_variable("", &[]).is_err());

        // the store holds the header and the variable metadata
        let reopened = Array::open_store(array.storage()).unwrap();
        assert_eq!(reopened.get_fixed("random").unwrap(), 8.34f64.to_ne_bytes());
        assert_eq!(reopened.variable_names(), vec!["b"]);
        assert_eq!(reopened.shape(), &[30, 30]);
        assert_eq!(reopened.compression(), array.compression());
        array.free().unwrap();
    }

    /// A store that rejects writes while `readonly` is set.
    struct SwitchableStore {
        inner: MemoryStore,
        readonly: AtomicBool,
    }

    impl ReadableStorageTraits for SwitchableStore {
        fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
            self.inner.get(key)
        }
    }

    impl WritableStorageTraits for SwitchableStore {
        fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
            if self.readonly.load(Ordering::SeqCst) {
                return Err(StorageError::ReadOnly);
            }
            self.inner.set(key, value)
        }

        fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
            if self.readonly.load(Ordering::SeqCst) {
                return Err(StorageError::ReadOnly);
            }
            self.inner.erase(key)
        }
    }

    impl ListableStorageTraits for SwitchableStore {
        fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
            self.inner.list_prefix(prefix)
        }
    }

    #[test]
    fn array_variable_metadata_failed_write() {
        let store = Arc::new(SwitchableStore {
            inner: MemoryStore::new(),
            readonly: AtomicBool::new(false),
        });
        let array = Array::zeros(&memory_ctx(Metalayers::new())).unwrap();
        let header = array.storage().get(&metadata_key(HEADER_KEY).unwrap()).unwrap();
        store
            .set(&metadata_key(HEADER_KEY).unwrap(), header.unwrap())
            .unwrap();

        let mut array = Array::open_store(store.clone()).unwrap();
        array.set_variable("units", b"metres").unwrap();
        let vlmeta_key = metadata_key(VLMETA_KEY).unwrap();
        let stored = store.get(&vlmeta_key).unwrap();

        store.readonly.store(true, Ordering::SeqCst);
        assert!(matches!(
            array.set_variable("units", b"feet"),
            Err(ArrayError::Backend(BackendError::Storage(StorageError::ReadOnly)))
        ));
        assert!(matches!(
            array.set_variable("history", b"created"),
            Err(ArrayError::Backend(BackendError::Storage(StorageError::ReadOnly)))
        ));
        assert!(array.delete_variable("units").is_err());
        assert_eq!(array.get_variable("units").unwrap(), b"metres");
        assert_eq!(array.variable_names(), vec!["units"]);
        assert_eq!(store.get(&vlmeta_key).unwrap(), stored);

        // deleting the last entry removes the record
        store.readonly.store(false, Ordering::SeqCst);
        array.delete_variable("units").unwrap();
        assert!(store.get(&vlmeta_key).unwrap().is_none());
        assert!(Array::open_store(store)
            .unwrap()
            .variable_names()
            .is_empty());
    }

    #[test]
    fn array_open_store_invalid() {
        let store = Arc::new(MemoryStore::new());
        assert!(matches!(
            Array::open_store(store.clone()),
            Err(ArrayError::Backend(BackendError::MissingHeader))
        ));
        store
            .set(&StoreKey::new(HEADER_KEY).unwrap(), Bytes::from_static(b"{"))
            .unwrap();
        assert!(matches!(
            Array::open_store(store),
            Err(ArrayError::Backend(BackendError::InvalidHeader(_)))
        ));
    }

    #[test]
    fn array_chunks() {
        let array = Array::zeros(&memory_ctx(Metalayers::new())).unwrap();
        assert_eq!(array.num_stored_chunks().unwrap(), 0);
        assert_eq!(array.retrieve_chunk(3).unwrap(), vec![0; 20 * 20 * 4]);
        assert!(matches!(
            array.retrieve_chunk(4),
            Err(ArrayError::Dimension(_))
        ));

        array
            .store_chunk_encoded(0, Bytes::from_static(b"invalid"))
            .unwrap();
        assert!(matches!(
            array.retrieve_chunk(0),
            Err(ArrayError::Backend(BackendError::InvalidChunk { chunk_index: 0, .. }))
        ));
    }

    #[test]
    fn array_display() {
        let array = Array::zeros(&memory_ctx(Metalayers::new())).unwrap();
        assert_eq!(
            array.to_string(),
            "ndim: 2\nshape: [30, 30]\nchunk_shape: [20, 20]\nblock_shape: [10, 10]\ntypesize: 4\ncompression: lz4 (clevel 5, shuffle)\nmetalayers: []"
        );
        assert!(format!("{array:?}").starts_with("Array {"));
    }
}
