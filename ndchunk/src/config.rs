//! `ndchunk` global configuration options.

use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the ndchunk crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// # Copy Configuration Options
///
/// ## Copy Strategy
/// > default: [`CopyStrategy::Chunkwise`]
///
/// How [`Array::copy`](crate::array::Array::copy) moves data into a destination with a different
/// chunk or block shape. Both strategies produce arrays with identical contents.
///
/// Arrays with the same chunk shape, block shape, and compression parameters always have their
/// compressed chunk records copied verbatim, regardless of this option.
///
/// ## Chunk Cache Capacity
/// > default: `4`
///
/// The number of decompressed source chunks retained by a chunkwise copy.
/// A capacity of zero is treated as one.
///
/// # Compression Configuration Options
///
/// ## Default Number of Threads
/// > default: `1`
///
/// The number of internal compressor threads used by
/// [`CompressionParams::new`](crate::codec::CompressionParams::new).
#[derive(Debug)]
pub struct Config {
    copy_strategy: CopyStrategy,
    chunk_cache_capacity: usize,
    default_nthreads: usize,
}

/// The strategy used to copy between arrays of differing geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyStrategy {
    /// Build each destination chunk from the overlapping blocks of cached, decompressed source chunks.
    #[default]
    Chunkwise,
    /// Decompress the whole source into a dense buffer, then partition it for the destination.
    Dense,
}

#[allow(clippy::derivable_impls)]
impl Default for Config {
    fn default() -> Self {
        Config {
            copy_strategy: CopyStrategy::default(),
            chunk_cache_capacity: 4,
            default_nthreads: 1,
        }
    }
}

impl Config {
    /// Get the [copy strategy](#copy-strategy) configuration.
    #[must_use]
    pub fn copy_strategy(&self) -> CopyStrategy {
        self.copy_strategy
    }

    /// Set the [copy strategy](#copy-strategy) configuration.
    pub fn set_copy_strategy(&mut self, copy_strategy: CopyStrategy) {
        self.copy_strategy = copy_strategy;
    }

    /// Get the [chunk cache capacity](#chunk-cache-capacity) configuration.
    #[must_use]
    pub fn chunk_cache_capacity(&self) -> usize {
        self.chunk_cache_capacity
    }

    /// Set the [chunk cache capacity](#chunk-cache-capacity) configuration.
    pub fn set_chunk_cache_capacity(&mut self, capacity: usize) {
        self.chunk_cache_capacity = capacity;
    }

    /// Get the [default number of threads](#default-number-of-threads) configuration.
    #[must_use]
    pub fn default_nthreads(&self) -> usize {
        self.default_nthreads
    }

    /// Set the [default number of threads](#default-number-of-threads) configuration.
    pub fn set_default_nthreads(&mut self, nthreads: usize) {
        self.default_nthreads = nthreads;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global ndchunk configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global ndchunk configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn config_copy_strategy() {
        assert_eq!(global_config().copy_strategy(), CopyStrategy::Chunkwise);
        global_config_mut().set_copy_strategy(CopyStrategy::Dense);
        assert_eq!(global_config().copy_strategy(), CopyStrategy::Dense);
        global_config_mut().set_copy_strategy(CopyStrategy::Chunkwise);
    }

    #[test]
    #[serial_test::serial]
    fn config_chunk_cache_capacity() {
        assert_eq!(global_config().chunk_cache_capacity(), 4);
        global_config_mut().set_chunk_cache_capacity(1);
        assert_eq!(global_config().chunk_cache_capacity(), 1);
        global_config_mut().set_chunk_cache_capacity(4);
        assert_eq!(global_config().default_nthreads(), 1);
    }
}
