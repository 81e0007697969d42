//! Storage backend trait that all partition stores implement.

use async_trait::async_trait;

use crate::cache::entry::CacheEntry;
use crate::error::StorageResult;

/// A store of named partitions, each mapping request keys to entries.
///
/// Single-entry operations are atomic; nothing spans multiple entries.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the partition if absent. Returns `true` if it was created.
    async fn open(&self, partition: &str) -> StorageResult<bool>;

    /// Names of every existing partition, sorted.
    async fn partitions(&self) -> StorageResult<Vec<String>>;

    /// Delete a partition with all its entries. Returns `true` if it existed.
    async fn delete_partition(&self, partition: &str) -> StorageResult<bool>;

    async fn get(&self, partition: &str, key: &str) -> StorageResult<Option<CacheEntry>>;

    /// Store an entry, replacing any previous entry for the same key.
    /// A partition deleted in the meantime is recreated.
    async fn put(&self, partition: &str, entry: CacheEntry) -> StorageResult<()>;

    async fn remove(&self, partition: &str, key: &str) -> StorageResult<bool>;

    async fn keys(&self, partition: &str) -> StorageResult<Vec<String>>;

    /// Number of entries; zero for a missing partition.
    async fn len(&self, partition: &str) -> StorageResult<usize>;
}
