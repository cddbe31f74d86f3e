//! Stores included in this crate.

mod memory_store;

pub use memory_store::MemoryStore;
