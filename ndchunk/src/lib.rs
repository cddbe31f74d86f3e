//! `ndchunk` is a Rust library for chunked, blocked, and compressed N-dimensional arrays.
//!
//! An array of fixed-size elements (up to 8 dimensions) is partitioned into a regular grid of
//! chunks, and every chunk into a regular grid of blocks.
//! Each chunk is compressed with [Blosc](https://www.blosc.org) into a single record, with one
//! Blosc block per array block.
//! Arrays can be held in memory, in a single contiguous file, or in a directory with one file
//! per chunk.
//!
//! ## Getting Started
//! - Describe an array with an [`ArrayContext`](array::ArrayContext).
//! - Build it with [`Array::from_buffer`](array::Array::from_buffer),
//!   [`Array::zeros`](array::Array::zeros), or [`Array::full`](array::Array::full).
//! - Read it back with [`Array::to_vec`](array::Array::to_vec) or
//!   [`Array::get_slice_vec`](array::Array::get_slice_vec).
//! - Re-partition, re-compress, or persist it with [`Array::copy`](array::Array::copy) and
//!   [`Array::save`](array::Array::save).
//!
//! ## Logging
//! `ndchunk` logs information and warnings using the [`log`] crate.
//! A logging implementation must be enabled to capture logs.
//! See the [`log`] crate documentation for more details.
//!
//! ## Examples
//! ```rust
//! # use ndchunk::array::{Array, ArrayContext, StorageConfig};
//! # use ndchunk::codec::{BloscCompressor, CompressionParams};
//! # use ndchunk::metadata::Metalayers;
//! let dir = tempfile::TempDir::new()?;
//! let path = dir.path().join("array.ndc");
//!
//! let compression = CompressionParams::new(8).with_compressor(BloscCompressor::Zstd);
//! let ctx = ArrayContext::new(
//!     StorageConfig::contiguous(&path, compression),
//!     &[40, 15, 23],
//!     &[31, 5, 22],
//!     &[4, 4, 4],
//!     Metalayers::from_pairs([("units", b"kelvin")])?,
//! )?;
//! let mut array = Array::full(&ctx, &273.15f64.to_ne_bytes())?;
//! array.set_slice_buffer(&[0; 8], &[0, 0, 0], &[1, 1, 1])?;
//! array.set_variable("history", b"cooled the first element")?;
//! array.free()?;
//!
//! let array = Array::open(&path)?;
//! assert_eq!(array.get_fixed("units")?, b"kelvin");
//! let slice = array.get_slice_vec(&[0, 0, 0], &[1, 1, 2])?;
//! assert_eq!(slice[..8], [0; 8]);
//! assert_eq!(slice[8..], 273.15f64.to_ne_bytes());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Licence
//! `ndchunk` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted for inclusion in the work by you, as defined in the Apache-2.0 license, shall be dual licensed as above, without any additional terms or conditions.
#![warn(clippy::wildcard_enum_match_arm)]

pub mod array;
pub mod codec;
pub mod config;
pub mod metadata;

pub use ndchunk_filesystem as filesystem;
pub use ndchunk_geometry as geometry;
pub use ndchunk_storage as storage;
