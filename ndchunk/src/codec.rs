//! The compression boundary.
//!
//! Chunks are compressed with the [blosc](https://www.blosc.org/) C library, through a
//! [`BloscCodec`] configured from the [`CompressionParams`] of an array.

mod blosc;

pub use blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode, CompressionEngine,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::global_config;

/// A codec error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The compressor is not available in the linked blosc library.
    #[error("compressor {0} is not supported")]
    UnsupportedCompressor(BloscCompressor),
    /// An invalid compression level.
    #[error("invalid compression level {0}, must be between 0 and 9")]
    InvalidCompressionLevel(u8),
    /// Compression failed.
    #[error("blosc compression failed with code {0}")]
    CompressionFailed(i32),
    /// The encoded value is not a valid blosc buffer.
    #[error("blosc encoded value is invalid")]
    InvalidEncodedValue,
    /// Decompression failed.
    #[error("blosc decompression failed with code {0}")]
    DecompressionFailed(i32),
    /// The decoded value has an unexpected size.
    #[error("got decoded size {got}, expected {expected}")]
    UnexpectedDecodedSize {
        /// The decoded size.
        got: usize,
        /// The expected size.
        expected: usize,
    },
    /// The value is too large for the blosc library.
    #[error("value of {0} bytes is too large to compress")]
    TooLarge(usize),
}

/// Compression parameters of an array.
///
/// Serialized in the header of every array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionParams {
    compressor: BloscCompressor,
    clevel: BloscCompressionLevel,
    shuffle: BloscShuffleMode,
    typesize: usize,
    nthreads: usize,
}

impl CompressionParams {
    /// Create compression parameters for elements of `typesize` bytes.
    ///
    /// Defaults to the `lz4` compressor at level 5 with byte shuffling, and the
    /// [default number of threads](crate::config::Config#default-number-of-threads).
    #[must_use]
    pub fn new(typesize: usize) -> Self {
        Self {
            compressor: BloscCompressor::LZ4,
            clevel: BloscCompressionLevel::default(),
            shuffle: BloscShuffleMode::Shuffle,
            typesize,
            nthreads: global_config().default_nthreads(),
        }
    }

    /// Set the compressor.
    #[must_use]
    pub fn with_compressor(mut self, compressor: BloscCompressor) -> Self {
        self.compressor = compressor;
        self
    }

    /// Set the compression level.
    #[must_use]
    pub fn with_clevel(mut self, clevel: BloscCompressionLevel) -> Self {
        self.clevel = clevel;
        self
    }

    /// Set the shuffle mode.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: BloscShuffleMode) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set the number of internal compressor threads.
    #[must_use]
    pub fn with_nthreads(mut self, nthreads: usize) -> Self {
        self.nthreads = nthreads;
        self
    }

    /// Return the compressor.
    #[must_use]
    pub fn compressor(&self) -> BloscCompressor {
        self.compressor
    }

    /// Return the compression level.
    #[must_use]
    pub fn clevel(&self) -> BloscCompressionLevel {
        self.clevel
    }

    /// Return the shuffle mode.
    #[must_use]
    pub fn shuffle(&self) -> BloscShuffleMode {
        self.shuffle
    }

    /// Return the element size in bytes.
    #[must_use]
    pub fn typesize(&self) -> usize {
        self.typesize
    }

    /// Return the number of internal compressor threads.
    #[must_use]
    pub fn nthreads(&self) -> usize {
        self.nthreads
    }

    /// Returns true if chunks compressed with `self` and `other` are interchangeable.
    ///
    /// The number of threads does not affect the compressed representation.
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.compressor == other.compressor
            && self.clevel == other.clevel
            && self.shuffle == other.shuffle
            && self.typesize == other.typesize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_params() {
        let params = CompressionParams::new(4)
            .with_compressor(BloscCompressor::Zstd)
            .with_clevel(BloscCompressionLevel::try_from(9).unwrap())
            .with_shuffle(BloscShuffleMode::BitShuffle);
        assert_eq!(params.typesize(), 4);
        assert_eq!(params.compressor(), BloscCompressor::Zstd);
        assert!(params.is_equivalent(&params.clone().with_nthreads(4)));
        assert!(!params.is_equivalent(&CompressionParams::new(4)));

        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(
            json,
            format!(
                r#"{{"compressor":"zstd","clevel":9,"shuffle":"bitshuffle","typesize":4,"nthreads":{}}}"#,
                params.nthreads()
            )
        );
        let params2: CompressionParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, params2);

        assert!(serde_json::from_str::<CompressionParams>(
            r#"{"compressor":"zstd","clevel":10,"shuffle":"shuffle","typesize":4,"nthreads":1}"#
        )
        .is_err());
    }
}
