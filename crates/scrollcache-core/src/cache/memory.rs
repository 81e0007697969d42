//! In-memory partition store with an optional byte quota.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::entry::CacheEntry;
use crate::cache::storage::CacheStorage;
use crate::error::{StorageError, StorageResult};

#[derive(Default)]
struct Inner {
    partitions: BTreeMap<String, HashMap<String, CacheEntry>>,
    /// Sum of body sizes across all partitions
    used_bytes: u64,
}

#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
    quota_bytes: Option<u64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that refuses writes once stored bodies would exceed `quota_bytes`.
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn used_bytes(&self) -> u64 {
        self.inner.lock().used_bytes
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, partition: &str) -> StorageResult<bool> {
        let mut inner = self.inner.lock();
        if inner.partitions.contains_key(partition) {
            return Ok(false);
        }
        inner.partitions.insert(partition.to_string(), HashMap::new());
        debug!(partition, "Created memory partition");
        Ok(true)
    }

    async fn partitions(&self) -> StorageResult<Vec<String>> {
        Ok(self.inner.lock().partitions.keys().cloned().collect())
    }

    async fn delete_partition(&self, partition: &str) -> StorageResult<bool> {
        let mut inner = self.inner.lock();
        match inner.partitions.remove(partition) {
            Some(entries) => {
                let freed: u64 = entries.values().map(CacheEntry::size).sum();
                inner.used_bytes = inner.used_bytes.saturating_sub(freed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, partition: &str, key: &str) -> StorageResult<Option<CacheEntry>> {
        Ok(self
            .inner
            .lock()
            .partitions
            .get(partition)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, partition: &str, entry: CacheEntry) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        let replaced = inner
            .partitions
            .get(partition)
            .and_then(|entries| entries.get(entry.key()))
            .map(CacheEntry::size)
            .unwrap_or(0);

        let used_after = inner.used_bytes - replaced + entry.size();
        if let Some(quota) = self.quota_bytes {
            if used_after > quota {
                return Err(StorageError::QuotaExceeded {
                    requested: entry.size(),
                    available: quota.saturating_sub(inner.used_bytes - replaced),
                });
            }
        }

        inner.used_bytes = used_after;
        inner
            .partitions
            .entry(partition.to_string())
            .or_default()
            .insert(entry.key().to_string(), entry);
        Ok(())
    }

    async fn remove(&self, partition: &str, key: &str) -> StorageResult<bool> {
        let mut inner = self.inner.lock();
        let removed = inner
            .partitions
            .get_mut(partition)
            .and_then(|entries| entries.remove(key));
        match removed {
            Some(entry) => {
                inner.used_bytes = inner.used_bytes.saturating_sub(entry.size());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self, partition: &str) -> StorageResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .inner
            .lock()
            .partitions
            .get(partition)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn len(&self, partition: &str) -> StorageResult<usize> {
        Ok(self
            .inner
            .lock()
            .partitions
            .get(partition)
            .map(HashMap::len)
            .unwrap_or(0))
    }
}
