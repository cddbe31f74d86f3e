use std::path::{Path, PathBuf};

use ndchunk_filesystem::check_path_available;
use ndchunk_geometry::Geometry;

use super::{ArrayError, BackendError};
use crate::codec::{BloscCodec, CompressionEngine, CompressionParams};
use crate::metadata::Metalayers;

/// Where and how an array is stored.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    urlpath: Option<PathBuf>,
    contiguous: bool,
    compression: CompressionParams,
}

impl StorageConfig {
    /// An in-memory array.
    #[must_use]
    pub fn memory(compression: CompressionParams) -> Self {
        Self {
            urlpath: None,
            contiguous: false,
            compression,
        }
    }

    /// A persistent array held in a single file at `path`.
    #[must_use]
    pub fn contiguous<P: AsRef<Path>>(path: P, compression: CompressionParams) -> Self {
        Self {
            urlpath: Some(path.as_ref().to_path_buf()),
            contiguous: true,
            compression,
        }
    }

    /// A persistent array held in a directory at `path`, one file per key.
    #[must_use]
    pub fn directory<P: AsRef<Path>>(path: P, compression: CompressionParams) -> Self {
        Self {
            urlpath: Some(path.as_ref().to_path_buf()),
            contiguous: false,
            compression,
        }
    }

    /// Return the path of a persistent array, or [`None`] if the array is in memory.
    #[must_use]
    pub fn urlpath(&self) -> Option<&Path> {
        self.urlpath.as_deref()
    }

    /// Returns true if a persistent array is held in a single file.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        self.contiguous
    }

    /// Return the compression parameters.
    #[must_use]
    pub fn compression(&self) -> &CompressionParams {
        &self.compression
    }
}

/// A validated array creation context.
///
/// Holds the geometry, storage configuration, and initial metalayers of arrays built from it.
/// A context owns no array, and any number of arrays may be built from one context.
#[derive(Debug)]
pub struct ArrayContext {
    geometry: Geometry,
    storage: StorageConfig,
    metalayers: Metalayers,
    codec: BloscCodec,
    _engine: CompressionEngine,
}

impl ArrayContext {
    /// Create a new array context.
    ///
    /// The element size is the typesize of the compression parameters of `storage`.
    /// No store is created until an array is built.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - the shapes or typesize do not form a valid [`Geometry`],
    ///  - the compressor is not supported, or
    ///  - the path of a persistent array already exists or is not writable.
    pub fn new(
        storage: StorageConfig,
        shape: &[u64],
        chunk_shape: &[u64],
        block_shape: &[u64],
        metalayers: Metalayers,
    ) -> Result<Self, ArrayError> {
        let engine = CompressionEngine::acquire();
        let geometry = Geometry::new(
            shape,
            chunk_shape,
            block_shape,
            storage.compression.typesize(),
        )?;
        let codec = BloscCodec::new(&storage.compression, geometry.block_nbytes())
            .map_err(BackendError::from)?;
        if let Some(urlpath) = storage.urlpath() {
            check_path_available(urlpath).map_err(BackendError::from)?;
        }
        Ok(Self {
            geometry,
            storage,
            metalayers,
            codec,
            _engine: engine,
        })
    }

    /// Return the geometry.
    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Return the storage configuration.
    #[must_use]
    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Return the initial metalayers.
    #[must_use]
    pub fn metalayers(&self) -> &Metalayers {
        &self.metalayers
    }

    pub(crate) fn codec(&self) -> &BloscCodec {
        &self.codec
    }

    /// Release the context.
    ///
    /// Arrays built from the context are unaffected.
    pub fn free(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndchunk_filesystem::FilesystemStoreCreateError;
    use ndchunk_geometry::DimensionError;

    #[test]
    fn array_context() {
        let ctx = ArrayContext::new(
            StorageConfig::memory(CompressionParams::new(4)),
            &[30, 30],
            &[20, 20],
            &[10, 10],
            Metalayers::new(),
        )
        .unwrap();
        assert_eq!(ctx.geometry().typesize(), 4);
        assert_eq!(ctx.codec().blocksize(), 400);
        assert!(ctx.storage().urlpath().is_none());
        ctx.free();

        assert!(matches!(
            ArrayContext::new(
                StorageConfig::memory(CompressionParams::new(4)),
                &[30, 30],
                &[20, 20],
                &[30, 10],
                Metalayers::new(),
            ),
            Err(ArrayError::Dimension(DimensionError::InvalidBlockShape { .. }))
        ));
        assert!(matches!(
            ArrayContext::new(
                StorageConfig::memory(CompressionParams::new(0)),
                &[30, 30],
                &[20, 20],
                &[10, 10],
                Metalayers::new(),
            ),
            Err(ArrayError::Dimension(DimensionError::InvalidTypesize))
        ));
    }

    #[test]
    fn array_context_path_exists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("array.ndc");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            ArrayContext::new(
                StorageConfig::contiguous(&path, CompressionParams::new(1)),
                &[10],
                &[5],
                &[5],
                Metalayers::new(),
            ),
            Err(ArrayError::Backend(BackendError::Filesystem(
                FilesystemStoreCreateError::AlreadyExists(_)
            )))
        ));
        let ctx = ArrayContext::new(
            StorageConfig::directory(dir.path().join("array"), CompressionParams::new(1)),
            &[10],
            &[5],
            &[5],
            Metalayers::new(),
        )
        .unwrap();
        assert!(!ctx.storage().is_contiguous());
    }
}
