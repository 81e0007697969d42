//! Versioned cache partitions.
//!
//! This module provides the `CacheManager`, which owns the shell, content
//! and image partitions of the current cache version, on top of a
//! `CacheStorage` backend:
//!
//! - `MemoryStorage`: in-process, optional byte quota
//! - `DiskStorage`: one directory per partition, one file per entry
//!
//! Entries are keyed by normalized request URL and overwritten on every
//! successful network fetch. They never expire on their own; a partition
//! goes away only when its version becomes stale or the cache is cleared.

pub mod disk;
pub mod entry;
pub mod manager;
pub mod memory;
pub mod storage;

pub use disk::DiskStorage;
pub use entry::{format_age, CacheEntry};
pub use manager::{CacheManager, PartitionHandle, PartitionRole, PartitionSummary};
pub use memory::MemoryStorage;
pub use storage::CacheStorage;
