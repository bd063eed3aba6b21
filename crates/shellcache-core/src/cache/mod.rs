//! Named cache stores for offline resources.
//!
//! This module provides the `CacheStorage` trait the worker reads and writes
//! through, plus two backends:
//! - `MemoryStorage`: process-local maps
//! - `DiskStorage`: one directory per store under a cache root
//!
//! The worker owns three stores: a temporary staging store, the persistent
//! content store, and a single-entry store holding the last applied manifest.

pub mod disk;
pub mod memory;
pub mod storage;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;
pub use storage::{
    CacheStorage, CachedResponse, ALL_STORES, CONTENT_STORE, MANIFEST_KEY, MANIFEST_STORE,
    TEMP_STORE,
};
