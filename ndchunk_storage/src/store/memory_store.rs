//! A synchronous in-memory store.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::{
    Bytes, ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
    StoreKeys, StorePrefix, WritableStorageTraits,
};

/// A synchronous in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data_map: Mutex<BTreeMap<StoreKey, Bytes>>,
}

impl MemoryStore {
    /// Create a new memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadableStorageTraits for MemoryStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        Ok(self.data_map.lock().get(key).cloned())
    }
}

impl WritableStorageTraits for MemoryStore {
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.data_map.lock().insert(key.clone(), value);
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.data_map.lock().remove(key);
        Ok(())
    }
}

impl ListableStorageTraits for MemoryStore {
    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        Ok(self
            .data_map
            .lock()
            .keys()
            .filter(|&key| key.has_prefix(prefix))
            .cloned()
            .collect())
    }
}
