use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cache::entry::CacheEntry;
use crate::cache::storage::CacheStorage;
use crate::classify::ResourceClass;
use crate::clock::{Clock, SystemClock};
use crate::config::{PartitionNames, WorkerConfig};
use crate::error::StorageResult;
use crate::http::Response;

/// Logical role of a partition. One live partition per role per version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionRole {
    Shell,
    Content,
    Image,
}

impl PartitionRole {
    pub const ALL: [PartitionRole; 3] = [PartitionRole::Shell, PartitionRole::Content, PartitionRole::Image];

    /// Partition consulted for a resource class; `Other` is never cached.
    pub fn for_class(class: ResourceClass) -> Option<Self> {
        match class {
            ResourceClass::Shell => Some(PartitionRole::Shell),
            ResourceClass::Content => Some(PartitionRole::Content),
            ResourceClass::Image => Some(PartitionRole::Image),
            ResourceClass::Other => None,
        }
    }
}

impl fmt::Display for PartitionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartitionRole::Shell => "shell",
            PartitionRole::Content => "content",
            PartitionRole::Image => "image",
        };
        f.write_str(name)
    }
}

/// An opened partition of the current version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionHandle {
    role: PartitionRole,
    name: String,
}

impl PartitionHandle {
    pub fn role(&self) -> PartitionRole {
        self.role
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Versioned partition names, e.g. `shell-v2`, `data-v2`, `img-v2`.
#[derive(Debug, Clone)]
struct PartitionTable {
    names: PartitionNames,
    version: String,
}

impl PartitionTable {
    fn name(&self, role: PartitionRole) -> String {
        let prefix = match role {
            PartitionRole::Shell => &self.names.shell,
            PartitionRole::Content => &self.names.content,
            PartitionRole::Image => &self.names.image,
        };
        format!("{}-{}", prefix, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub name: String,
    pub entries: usize,
    pub newest: Option<DateTime<Utc>>,
    /// Whether the partition belongs to the current version
    pub current: bool,
}

/// Owns the current version's partitions on top of a storage backend.
/// Clone is cheap; clones share the backend.
#[derive(Clone)]
pub struct CacheManager {
    storage: Arc<dyn CacheStorage>,
    table: Arc<PartitionTable>,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    pub fn new(storage: Arc<dyn CacheStorage>, config: &WorkerConfig) -> Self {
        Self {
            storage,
            table: Arc::new(PartitionTable {
                names: config.partitions.clone(),
                version: config.cache_version.clone(),
            }),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn version(&self) -> &str {
        &self.table.version
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn partition_name(&self, role: PartitionRole) -> String {
        self.table.name(role)
    }

    /// Names making up the current version set.
    pub fn current_names(&self) -> Vec<String> {
        PartitionRole::ALL.iter().map(|&role| self.table.name(role)).collect()
    }

    /// Idempotent: opening the same role twice yields equal handles to the
    /// same underlying partition.
    pub async fn open_partition(&self, role: PartitionRole) -> StorageResult<PartitionHandle> {
        let name = self.table.name(role);
        if self.storage.open(&name).await? {
            debug!(partition = %name, role = %role, "Opened new partition");
        }
        Ok(PartitionHandle { role, name })
    }

    pub async fn match_key(&self, handle: &PartitionHandle, key: &str) -> StorageResult<Option<Response>> {
        let entry = self.storage.get(&handle.name, key).await?;
        Ok(entry.map(|e| e.to_response()))
    }

    /// Look a key up in every current partition, shell first.
    pub async fn match_any(&self, key: &str) -> StorageResult<Option<Response>> {
        for name in self.current_names() {
            if let Some(entry) = self.storage.get(&name, key).await? {
                debug!(key, partition = %name, "Matched key in fallback partition");
                return Ok(Some(entry.to_response()));
            }
        }
        Ok(None)
    }

    /// Store a copy of a successful response, replacing any previous entry.
    /// Unsuccessful responses are never stored.
    pub async fn put(&self, handle: &PartitionHandle, key: &str, response: &Response) -> StorageResult<()> {
        if !response.is_ok() {
            debug!(key, status = response.status, "Not caching unsuccessful response");
            return Ok(());
        }
        let entry = CacheEntry::from_response(key, response, self.clock.now());
        self.storage.put(&handle.name, entry).await
    }

    pub async fn delete(&self, handle: &PartitionHandle, key: &str) -> StorageResult<bool> {
        self.storage.remove(&handle.name, key).await
    }

    pub async fn keys(&self, handle: &PartitionHandle) -> StorageResult<Vec<String>> {
        self.storage.keys(&handle.name).await
    }

    /// Delete every partition whose name is not in `current`.
    /// Returns the deleted names.
    pub async fn delete_stale_partitions(&self, current: &[String]) -> StorageResult<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.storage.partitions().await? {
            if current.contains(&name) {
                continue;
            }
            if self.storage.delete_partition(&name).await? {
                info!(partition = %name, "Deleted stale partition");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Delete every partition, current ones included. Returns how many went.
    pub async fn clear_all(&self) -> StorageResult<usize> {
        let mut deleted = 0;
        for name in self.storage.partitions().await? {
            if self.storage.delete_partition(&name).await? {
                deleted += 1;
            }
        }
        info!(deleted, "Cleared all partitions");
        Ok(deleted)
    }

    /// Total entry count across all partitions. An approximation of cache
    /// usage, not a byte size.
    pub async fn size_of(&self) -> StorageResult<u64> {
        let mut total = 0u64;
        for name in self.storage.partitions().await? {
            total += self.storage.len(&name).await? as u64;
        }
        Ok(total)
    }

    pub async fn summaries(&self) -> StorageResult<Vec<PartitionSummary>> {
        let current = self.current_names();
        let mut summaries = Vec::new();
        for name in self.storage.partitions().await? {
            let mut newest: Option<DateTime<Utc>> = None;
            let keys = self.storage.keys(&name).await?;
            for key in &keys {
                match self.storage.get(&name, key).await {
                    Ok(Some(entry)) => {
                        newest = Some(newest.map_or(entry.stored_at(), |n| n.max(entry.stored_at())));
                    }
                    Ok(None) => {}
                    Err(e) => warn!(partition = %name, key = %key, error = %e, "Failed to read entry"),
                }
            }
            summaries.push(PartitionSummary {
                current: current.contains(&name),
                entries: keys.len(),
                newest,
                name,
            });
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryStorage;
    use crate::clock::FixedClock;
    use chrono::TimeZone;

    fn manager_for(storage: Arc<dyn CacheStorage>, version: &str) -> CacheManager {
        let config = WorkerConfig {
            cache_version: version.to_string(),
            ..WorkerConfig::default()
        };
        CacheManager::new(storage, &config)
    }

    fn ok(body: &str) -> Response {
        Response::new(200, body.to_string())
    }

    #[tokio::test]
    async fn test_partition_names_are_versioned() {
        let manager = manager_for(Arc::new(MemoryStorage::new()), "v2");
        assert_eq!(manager.current_names(), vec!["shell-v2", "data-v2", "img-v2"]);
        assert_eq!(manager.partition_name(PartitionRole::Content), "data-v2");
    }

    #[tokio::test]
    async fn test_open_partition_idempotent() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager_for(storage.clone(), "v2");
        let first = manager.open_partition(PartitionRole::Content).await.unwrap();
        manager.put(&first, "k", &ok("body")).await.unwrap();

        let second = manager.open_partition(PartitionRole::Content).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(storage.partitions().await.unwrap(), vec!["data-v2"]);
        // Still the same partition, entry intact
        assert!(manager.match_key(&second, "k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_put_skips_unsuccessful_responses() {
        let manager = manager_for(Arc::new(MemoryStorage::new()), "v2");
        let handle = manager.open_partition(PartitionRole::Content).await.unwrap();
        manager.put(&handle, "k", &Response::new(404, "nope")).await.unwrap();
        assert!(manager.match_key(&handle, "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_law() {
        let manager = manager_for(Arc::new(MemoryStorage::new()), "v2");
        let handle = manager.open_partition(PartitionRole::Content).await.unwrap();
        manager.put(&handle, "k", &ok("first")).await.unwrap();
        manager.put(&handle, "k", &ok("second")).await.unwrap();

        let served = manager.match_key(&handle, "k").await.unwrap().unwrap();
        assert_eq!(served.text(), "second");
        assert_eq!(manager.size_of().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stale_partition_cleanup() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let old = manager_for(storage.clone(), "v1");
        for role in PartitionRole::ALL {
            let handle = old.open_partition(role).await.unwrap();
            old.put(&handle, "k", &ok("old")).await.unwrap();
        }

        let new = manager_for(storage.clone(), "v2");
        for role in PartitionRole::ALL {
            new.open_partition(role).await.unwrap();
        }

        let mut deleted = new.delete_stale_partitions(&new.current_names()).await.unwrap();
        deleted.sort();
        assert_eq!(deleted, vec!["data-v1", "img-v1", "shell-v1"]);
        assert_eq!(storage.partitions().await.unwrap(), vec!["data-v2", "img-v2", "shell-v2"]);
    }

    #[tokio::test]
    async fn test_clear_all_and_size() {
        let manager = manager_for(Arc::new(MemoryStorage::new()), "v2");
        let shell = manager.open_partition(PartitionRole::Shell).await.unwrap();
        let content = manager.open_partition(PartitionRole::Content).await.unwrap();
        manager.put(&shell, "a", &ok("a")).await.unwrap();
        manager.put(&content, "b", &ok("b")).await.unwrap();
        manager.put(&content, "c", &ok("c")).await.unwrap();
        assert_eq!(manager.size_of().await.unwrap(), 3);

        assert_eq!(manager.clear_all().await.unwrap(), 2);
        assert_eq!(manager.size_of().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_match_any_searches_current_partitions() {
        let manager = manager_for(Arc::new(MemoryStorage::new()), "v2");
        let shell = manager.open_partition(PartitionRole::Shell).await.unwrap();
        manager.put(&shell, "icon", &ok("png")).await.unwrap();

        assert_eq!(manager.match_any("icon").await.unwrap().unwrap().text(), "png");
        assert!(manager.match_any("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_summaries_report_newest_entry() {
        let stamp = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        storage.open("data-v1").await.unwrap();
        let manager = manager_for(storage, "v2").with_clock(Arc::new(FixedClock(stamp)));
        let content = manager.open_partition(PartitionRole::Content).await.unwrap();
        manager.put(&content, "k", &ok("x")).await.unwrap();

        let summaries = manager.summaries().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "data-v1");
        assert!(!summaries[0].current);
        assert_eq!(summaries[0].newest, None);
        assert_eq!(summaries[1].name, "data-v2");
        assert!(summaries[1].current);
        assert_eq!(summaries[1].entries, 1);
        assert_eq!(summaries[1].newest, Some(stamp));
    }
}
