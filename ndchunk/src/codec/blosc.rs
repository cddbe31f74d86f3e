use std::ffi::{c_char, c_int, c_void, CStr};

use blosc_src::{
    blosc_cbuffer_validate, blosc_compress_ctx, blosc_decompress_ctx, blosc_destroy,
    blosc_get_complib_info, blosc_init, BLOSC_MAX_OVERHEAD,
};
use derive_more::Display;
use parking_lot::{const_mutex, Mutex};
use serde::{Deserialize, Serialize};

use super::{CodecError, CompressionParams};

/// The largest typesize honoured by the shuffle filters.
const BLOSC_MAX_TYPESIZE: usize = 255;

/// The blosc compressor.
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug, Display)]
#[serde(rename_all = "lowercase")]
pub enum BloscCompressor {
    /// [BloscLZ](https://github.com/Blosc/c-blosc/blob/master/blosc/blosclz.h): blosc default compressor, heavily based on [FastLZ](http://fastlz.org/).
    #[display("blosclz")]
    BloscLZ,
    /// [LZ4](http://fastcompression.blogspot.com/p/lz4.html): a compact, very popular and fast compressor.
    #[display("lz4")]
    LZ4,
    /// [LZ4HC](http://fastcompression.blogspot.com/p/lz4.html): a tweaked version of LZ4, produces better compression ratios at the expense of speed.
    #[display("lz4hc")]
    LZ4HC,
    /// [Snappy](https://code.google.com/p/snappy): a popular compressor used in many places.
    #[display("snappy")]
    Snappy,
    /// [Zlib](http://www.zlib.net/): a classic, somewhat slower than the previous ones, but achieving better compression ratios.
    #[display("zlib")]
    Zlib,
    /// [Zstd](http://www.zstd.net/): an extremely well balanced codec; it provides the best compression ratios among the others above, and at reasonably fast speed.
    #[display("zstd")]
    Zstd,
}

impl BloscCompressor {
    fn as_cstr(self) -> &'static CStr {
        match self {
            Self::BloscLZ => c"blosclz",
            Self::LZ4 => c"lz4",
            Self::LZ4HC => c"lz4hc",
            Self::Snappy => c"snappy",
            Self::Zlib => c"zlib",
            Self::Zstd => c"zstd",
        }
    }

    /// Returns true if the compressor is available in the linked blosc library.
    #[must_use]
    pub fn is_supported(self) -> bool {
        let support = unsafe {
            blosc_get_complib_info(
                self.as_cstr().as_ptr(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        support >= 0
    }
}

/// The blosc shuffle mode.
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug, Display)]
#[serde(rename_all = "lowercase")]
pub enum BloscShuffleMode {
    /// No shuffling.
    #[display("noshuffle")]
    NoShuffle,
    /// Byte-wise shuffling.
    #[display("shuffle")]
    Shuffle,
    /// Bit-wise shuffling.
    #[display("bitshuffle")]
    BitShuffle,
}

impl BloscShuffleMode {
    fn as_c_int(self) -> c_int {
        match self {
            Self::NoShuffle => 0,
            Self::Shuffle => 1,
            Self::BitShuffle => 2,
        }
    }
}

/// The blosc compression level, an integer from 0 (no compression) to 9 (maximum compression).
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug, Display)]
#[serde(try_from = "u8", into = "u8")]
pub struct BloscCompressionLevel(u8);

impl Default for BloscCompressionLevel {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u8> for BloscCompressionLevel {
    type Error = CodecError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        if level <= 9 {
            Ok(Self(level))
        } else {
            Err(CodecError::InvalidCompressionLevel(level))
        }
    }
}

impl From<BloscCompressionLevel> for u8 {
    fn from(level: BloscCompressionLevel) -> Self {
        level.0
    }
}

static ENGINE_USERS: Mutex<usize> = const_mutex(0);

/// A handle on the process-wide blosc library state.
///
/// The library is initialised when the first handle is acquired and destroyed when the last one
/// is dropped. Every [`ArrayContext`](crate::array::ArrayContext) and
/// [`Array`](crate::array::Array) holds a handle.
#[derive(Debug)]
pub struct CompressionEngine {
    _private: (),
}

impl CompressionEngine {
    /// Acquire a handle, initialising the library if there are no other handles.
    #[must_use]
    pub fn acquire() -> Self {
        let mut users = ENGINE_USERS.lock();
        if *users == 0 {
            unsafe { blosc_init() };
            log::debug!("initialised the blosc library");
        }
        *users += 1;
        Self { _private: () }
    }

    /// Return the number of live handles.
    #[must_use]
    pub fn users() -> usize {
        *ENGINE_USERS.lock()
    }
}

impl Clone for CompressionEngine {
    fn clone(&self) -> Self {
        Self::acquire()
    }
}

impl Drop for CompressionEngine {
    fn drop(&mut self) {
        let mut users = ENGINE_USERS.lock();
        *users = users.saturating_sub(1);
        if *users == 0 {
            unsafe { blosc_destroy() };
            log::debug!("destroyed the blosc library");
        }
    }
}

/// A blosc codec.
///
/// Compresses a decompressed chunk into a single blosc buffer. The internal blosc block size is
/// set to the size of a geometry block, so each geometry block is compressed independently.
#[derive(Clone, Debug)]
pub struct BloscCodec {
    compressor: BloscCompressor,
    clevel: BloscCompressionLevel,
    shuffle: BloscShuffleMode,
    typesize: usize,
    blocksize: usize,
}

impl BloscCodec {
    /// Create a new blosc codec from compression parameters and a block size in bytes.
    ///
    /// A `blocksize` of zero lets blosc choose the block size automatically.
    ///
    /// # Errors
    /// Returns [`CodecError::UnsupportedCompressor`] if the compressor is not available.
    pub fn new(params: &CompressionParams, blocksize: usize) -> Result<Self, CodecError> {
        let compressor = params.compressor();
        if !compressor.is_supported() {
            return Err(CodecError::UnsupportedCompressor(compressor));
        }
        if params.shuffle() != BloscShuffleMode::NoShuffle
            && params.typesize() > BLOSC_MAX_TYPESIZE
        {
            log::warn!(
                "shuffle has no effect for a typesize of {} (greater than {BLOSC_MAX_TYPESIZE})",
                params.typesize()
            );
        }
        if u8::from(params.clevel()) == 0 {
            log::warn!("compression level 0 stores chunks uncompressed");
        }
        Ok(Self {
            compressor,
            clevel: params.clevel(),
            shuffle: params.shuffle(),
            typesize: params.typesize(),
            blocksize,
        })
    }

    /// Return the compressor.
    #[must_use]
    pub fn compressor(&self) -> BloscCompressor {
        self.compressor
    }

    /// Return the internal block size in bytes.
    #[must_use]
    pub fn blocksize(&self) -> usize {
        self.blocksize
    }

    /// Compress `decoded_value` with `nthreads` internal threads.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if compression fails.
    pub fn compress(&self, decoded_value: &[u8], nthreads: usize) -> Result<Vec<u8>, CodecError> {
        if i32::try_from(decoded_value.len()).is_err() {
            return Err(CodecError::TooLarge(decoded_value.len()));
        }
        let destsize = decoded_value.len() + BLOSC_MAX_OVERHEAD as usize;
        let mut dest = vec![0u8; destsize];
        let compressed_size = unsafe {
            blosc_compress_ctx(
                c_int::from(u8::from(self.clevel)),
                self.shuffle.as_c_int(),
                std::cmp::max(1, self.typesize),
                decoded_value.len(),
                decoded_value.as_ptr().cast::<c_void>(),
                dest.as_mut_ptr().cast::<c_void>(),
                destsize,
                self.compressor.as_cstr().as_ptr().cast::<c_char>(),
                self.blocksize,
                nthreads_as_c_int(nthreads),
            )
        };
        match usize::try_from(compressed_size) {
            Ok(compressed_size) if compressed_size > 0 => {
                dest.truncate(compressed_size);
                Ok(dest)
            }
            _ => Err(CodecError::CompressionFailed(compressed_size)),
        }
    }

    /// Return the decompressed size of `encoded_value`.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidEncodedValue`] if `encoded_value` is not a valid blosc buffer.
    pub fn decompressed_size(encoded_value: &[u8]) -> Result<usize, CodecError> {
        let mut nbytes: usize = 0;
        let valid = unsafe {
            blosc_cbuffer_validate(
                encoded_value.as_ptr().cast::<c_void>(),
                encoded_value.len(),
                std::ptr::addr_of_mut!(nbytes),
            )
        } == 0;
        if valid {
            Ok(nbytes)
        } else {
            Err(CodecError::InvalidEncodedValue)
        }
    }

    /// Decompress `encoded_value` into `decoded_value` with `nthreads` internal threads.
    ///
    /// The decompressed size must equal the length of `decoded_value`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `encoded_value` is invalid, decompresses to a different size,
    /// or decompression fails.
    pub fn decompress_into(
        encoded_value: &[u8],
        decoded_value: &mut [u8],
        nthreads: usize,
    ) -> Result<(), CodecError> {
        let expected = Self::decompressed_size(encoded_value)?;
        if expected != decoded_value.len() {
            return Err(CodecError::UnexpectedDecodedSize {
                got: expected,
                expected: decoded_value.len(),
            });
        }
        if expected == 0 {
            return Ok(());
        }
        let decompressed_size = unsafe {
            blosc_decompress_ctx(
                encoded_value.as_ptr().cast::<c_void>(),
                decoded_value.as_mut_ptr().cast::<c_void>(),
                decoded_value.len(),
                nthreads_as_c_int(nthreads),
            )
        };
        match usize::try_from(decompressed_size) {
            Ok(size) if size == expected => Ok(()),
            Ok(size) => Err(CodecError::UnexpectedDecodedSize {
                got: size,
                expected,
            }),
            Err(_) => Err(CodecError::DecompressionFailed(decompressed_size)),
        }
    }

    /// Decompress `encoded_value` with `nthreads` internal threads.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `encoded_value` is invalid or decompression fails.
    pub fn decompress(encoded_value: &[u8], nthreads: usize) -> Result<Vec<u8>, CodecError> {
        let mut decoded_value = vec![0u8; Self::decompressed_size(encoded_value)?];
        Self::decompress_into(encoded_value, &mut decoded_value, nthreads)?;
        Ok(decoded_value)
    }
}

fn nthreads_as_c_int(nthreads: usize) -> c_int {
    c_int::try_from(nthreads.max(1)).unwrap_or(c_int::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(typesize: usize) -> CompressionParams {
        CompressionParams::new(typesize)
    }

    #[test]
    fn blosc_round_trip() {
        let _engine = CompressionEngine::acquire();
        let elements: Vec<u16> = (0..1024).collect();
        let bytes: Vec<u8> = elements.iter().flat_map(|e| e.to_ne_bytes()).collect();
        for compressor in [
            BloscCompressor::BloscLZ,
            BloscCompressor::LZ4,
            BloscCompressor::LZ4HC,
            BloscCompressor::Snappy,
            BloscCompressor::Zlib,
            BloscCompressor::Zstd,
        ] {
            for shuffle in [
                BloscShuffleMode::NoShuffle,
                BloscShuffleMode::Shuffle,
                BloscShuffleMode::BitShuffle,
            ] {
                let params = params(2).with_compressor(compressor).with_shuffle(shuffle);
                let codec = BloscCodec::new(&params, 256).unwrap();
                let encoded = codec.compress(&bytes, 1).unwrap();
                assert_eq!(BloscCodec::decompressed_size(&encoded).unwrap(), bytes.len());
                assert_eq!(BloscCodec::decompress(&encoded, 2).unwrap(), bytes);
            }
        }
    }

    #[test]
    fn blosc_empty() {
        let codec = BloscCodec::new(&params(4), 0).unwrap();
        let encoded = codec.compress(&[], 1).unwrap();
        assert!(BloscCodec::decompress(&encoded, 1).unwrap().is_empty());
    }

    #[test]
    fn blosc_invalid() {
        assert_eq!(
            BloscCodec::decompress(&[0, 1, 2], 1),
            Err(CodecError::InvalidEncodedValue)
        );
        let codec = BloscCodec::new(&params(1), 0).unwrap();
        let encoded = codec.compress(&[1, 2, 3, 4], 1).unwrap();
        let mut decoded = [0u8; 3];
        assert!(matches!(
            BloscCodec::decompress_into(&encoded, &mut decoded, 1),
            Err(CodecError::UnexpectedDecodedSize { .. })
        ));
    }

    #[test]
    fn blosc_compression_level() {
        assert!(BloscCompressionLevel::try_from(9).is_ok());
        assert_eq!(
            BloscCompressionLevel::try_from(10),
            Err(CodecError::InvalidCompressionLevel(10))
        );
        assert_eq!(BloscCompressionLevel::default().to_string(), "5");
        assert_eq!(BloscCompressor::LZ4HC.to_string(), "lz4hc");
        assert_eq!(
            serde_json::to_string(&BloscShuffleMode::NoShuffle).unwrap(),
            r#""noshuffle""#
        );
    }

    #[test]
    fn compression_engine() {
        let engine = CompressionEngine::acquire();
        assert!(CompressionEngine::users() >= 1);
        let engine2 = engine.clone();
        assert!(CompressionEngine::users() >= 2);
        drop(engine2);
        drop(engine);
    }

    #[test]
    fn blosc_warnings() {
        testing_logger::setup();
        let params = params(300)
            .with_clevel(BloscCompressionLevel::try_from(0).unwrap())
            .with_shuffle(BloscShuffleMode::Shuffle);
        BloscCodec::new(&params, 0).unwrap();
        testing_logger::validate(|captured_logs| {
            let warnings: Vec<_> = captured_logs
                .iter()
                .filter(|log| log.level == log::Level::Warn)
                .collect();
            assert_eq!(warnings.len(), 2);
            assert!(warnings[0].body.contains("typesize of 300"));
        });
    }
}
