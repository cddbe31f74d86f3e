use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use super::ArrayError;

/// An LRU (least recently used) cache of decompressed chunks with a fixed chunk capacity.
///
/// Chunks are keyed by their linear chunk index.
pub(crate) struct ChunkCacheDecodedLru {
    cache: LruCache<u64, Arc<Vec<u8>>>,
    misses: usize,
}

impl ChunkCacheDecodedLru {
    /// Create a new cache holding up to `chunk_capacity` chunks (at least one).
    pub(crate) fn new(chunk_capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(chunk_capacity).unwrap_or(NonZeroUsize::MIN)),
            misses: 0,
        }
    }

    /// Return the cached chunk `chunk_index`, or retrieve it with `retrieve` and cache it.
    pub(crate) fn retrieve_chunk<F>(
        &mut self,
        chunk_index: u64,
        retrieve: F,
    ) -> Result<Arc<Vec<u8>>, ArrayError>
    where
        F: FnOnce() -> Result<Vec<u8>, ArrayError>,
    {
        if let Some(chunk) = self.cache.get(&chunk_index) {
            return Ok(chunk.clone());
        }
        self.misses += 1;
        let chunk = Arc::new(retrieve()?);
        self.cache.put(chunk_index, chunk.clone());
        Ok(chunk)
    }

    /// Return the number of retrievals.
    pub(crate) fn misses(&self) -> usize {
        self.misses
    }
}
