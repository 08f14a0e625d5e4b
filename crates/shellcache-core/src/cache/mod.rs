//! Named request/response caches.
//!
//! This module provides the `CacheStorage` trait (the key-to-blob store the
//! worker is written against), the `CacheHandle` wrapper the handlers use,
//! and two backends:
//! - `MemoryCacheStorage`: process-local, used by tests and short-lived hosts
//! - `DiskCacheStorage`: one JSON file per entry under a cache directory

pub mod disk;
pub mod memory;
pub mod storage;

pub use disk::{CachedData, DiskCacheStorage, EntrySummary};
pub use memory::MemoryCacheStorage;
pub use storage::{CacheHandle, CacheStorage};
