//! Persistent partition store.
//!
//! Layout: `<root>/<partition>/<sha256(key)>.entry`. Each entry file holds
//! one line of JSON metadata, a newline, then the raw body. Writes go to a
//! temporary file that is renamed into place, so a reader sees either the
//! old entry or the new one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use crate::cache::entry::{CacheEntry, EntryMeta};
use crate::cache::storage::CacheStorage;
use crate::error::{StorageError, StorageResult};

const ENTRY_EXTENSION: &str = "entry";

#[derive(Debug)]
pub struct DiskStorage {
    root: PathBuf,
    /// Distinguishes temp files of concurrent writers
    write_seq: AtomicU64,
    /// Limit on the total size of entry files, metadata included
    quota_bytes: Option<u64>,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_seq: AtomicU64::new(0),
            quota_bytes: None,
        }
    }

    pub fn with_quota(root: impl Into<PathBuf>, quota_bytes: u64) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::new(root)
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: &str) -> StorageResult<PathBuf> {
        let valid = !partition.is_empty()
            && !partition.starts_with('.')
            && !partition.contains(['/', '\\']);
        if !valid {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid partition name: {:?}", partition),
            )));
        }
        Ok(self.root.join(partition))
    }

    fn entry_path(&self, partition: &str, key: &str) -> StorageResult<PathBuf> {
        let hash = hex::encode(Sha256::digest(key.as_bytes()));
        Ok(self
            .partition_dir(partition)?
            .join(format!("{}.{}", hash, ENTRY_EXTENSION)))
    }

    async fn read_entry(path: &Path) -> StorageResult<Option<CacheEntry>> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let raw = Bytes::from(raw);
        let split = raw.iter().position(|&b| b == b'\n').ok_or_else(|| {
            StorageError::Io(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("missing metadata line in {}", path.display()),
            ))
        })?;
        let meta: EntryMeta = serde_json::from_slice(&raw[..split])?;
        let body = raw.slice(split + 1..);
        Ok(Some(CacheEntry { meta, body }))
    }

    /// Entry files of a partition; empty if the partition does not exist.
    async fn entry_files(&self, partition: &str) -> StorageResult<Vec<PathBuf>> {
        let dir = self.partition_dir(partition)?;
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        while let Some(item) = read_dir.next_entry().await? {
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Bytes taken by entry files in every partition, skipping `except`.
    async fn used_bytes(&self, except: &Path) -> StorageResult<u64> {
        let mut used = 0;
        for partition in self.partitions().await? {
            for path in self.entry_files(&partition).await? {
                if path == except {
                    continue;
                }
                match fs::metadata(&path).await {
                    Ok(meta) => used += meta.len(),
                    // Removed by a concurrent writer
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(used)
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, partition: &str) -> StorageResult<bool> {
        let dir = self.partition_dir(partition)?;
        if fs::try_exists(&dir).await? {
            return Ok(false);
        }
        fs::create_dir_all(&dir).await?;
        debug!(partition, path = %dir.display(), "Created disk partition");
        Ok(true)
    }

    async fn partitions(&self) -> StorageResult<Vec<String>> {
        let mut read_dir = match fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(item) = read_dir.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = item.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_partition(&self, partition: &str) -> StorageResult<bool> {
        let dir = self.partition_dir(partition)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, partition: &str, key: &str) -> StorageResult<Option<CacheEntry>> {
        let path = self.entry_path(partition, key)?;
        match Self::read_entry(&path).await? {
            Some(entry) if entry.key() == key => Ok(Some(entry)),
            Some(entry) => {
                warn!(key, stored = entry.key(), "Cache file key mismatch, ignoring entry");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, partition: &str, entry: CacheEntry) -> StorageResult<()> {
        let path = self.entry_path(partition, entry.key())?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let mut contents = serde_json::to_vec(&entry.meta)?;
        contents.push(b'\n');
        contents.extend_from_slice(&entry.body);

        if let Some(quota) = self.quota_bytes {
            let used = self.used_bytes(&path).await?;
            let requested = contents.len() as u64;
            if used + requested > quota {
                return Err(StorageError::QuotaExceeded {
                    requested,
                    available: quota.saturating_sub(used),
                });
            }
        }

        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp-{}-{}", std::process::id(), seq));
        fs::write(&tmp, &contents).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, partition: &str, key: &str) -> StorageResult<bool> {
        let path = self.entry_path(partition, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, partition: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for path in self.entry_files(partition).await? {
            match Self::read_entry(&path).await {
                Ok(Some(entry)) => keys.push(entry.meta.key),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable cache file"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn len(&self, partition: &str) -> StorageResult<usize> {
        Ok(self.entry_files(partition).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Response;
    use chrono::Utc;

    fn entry(key: &str, body: &[u8]) -> CacheEntry {
        let response = Response::new(200, body.to_vec()).with_header("content-type", "text/plain");
        CacheEntry::from_response(key, &response, Utc::now())
    }

    #[tokio::test]
    async fn test_put_get_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = DiskStorage::new(dir.path());
            assert!(store.open("data-v2").await.unwrap());
            store
                .put("data-v2", entry("https://x/R-chapter1.txt", b"In the beginning..."))
                .await
                .unwrap();
        }

        let store = DiskStorage::new(dir.path());
        assert!(!store.open("data-v2").await.unwrap());
        let got = store.get("data-v2", "https://x/R-chapter1.txt").await.unwrap().unwrap();
        assert_eq!(&got.body[..], b"In the beginning...");
        assert_eq!(got.meta.headers, vec![("content-type".to_string(), "text/plain".to_string())]);
    }

    #[tokio::test]
    async fn test_quota_counts_every_partition() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStorage::with_quota(dir.path(), 1024);
        store.put("shell-v2", entry("a", &[b'a'; 600])).await.unwrap();

        let err = store.put("data-v2", entry("b", &[b'b'; 600])).await.unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        assert!(store.get("data-v2", "b").await.unwrap().is_none());

        // Replacing an entry only needs room for the difference
        store.put("shell-v2", entry("a", &[b'c'; 700])).await.unwrap();
    }

    #[tokio::test]
    async fn test_body_may_contain_newlines() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStorage::new(dir.path());
        store.put("data-v2", entry("k", b"line one\nline two\n")).await.unwrap();
        let got = store.get("data-v2", "k").await.unwrap().unwrap();
        assert_eq!(&got.body[..], b"line one\nline two\n");
    }

    #[tokio::test]
    async fn test_overwrite_and_len() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStorage::new(dir.path());
        store.put("data-v2", entry("k", b"old")).await.unwrap();
        store.put("data-v2", entry("k", b"new")).await.unwrap();
        store.put("data-v2", entry("k2", b"other")).await.unwrap();

        assert_eq!(store.len("data-v2").await.unwrap(), 2);
        assert_eq!(&store.get("data-v2", "k").await.unwrap().unwrap().body[..], b"new");
        assert_eq!(store.keys("data-v2").await.unwrap(), vec!["k", "k2"]);
    }

    #[tokio::test]
    async fn test_partitions_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStorage::new(dir.path().join("cache"));
        assert!(store.partitions().await.unwrap().is_empty());

        store.open("shell-v1").await.unwrap();
        store.open("data-v1").await.unwrap();
        assert_eq!(store.partitions().await.unwrap(), vec!["data-v1", "shell-v1"]);

        assert!(store.delete_partition("shell-v1").await.unwrap());
        assert!(!store.delete_partition("shell-v1").await.unwrap());
        assert_eq!(store.partitions().await.unwrap(), vec!["data-v1"]);
    }

    #[tokio::test]
    async fn test_missing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStorage::new(dir.path());
        assert!(store.get("nope", "k").await.unwrap().is_none());
        assert!(!store.remove("nope", "k").await.unwrap());
        assert_eq!(store.len("nope").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejects_path_like_partition_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStorage::new(dir.path());
        assert!(store.open("../escape").await.is_err());
        assert!(store.open("").await.is_err());
        assert!(store.open(".hidden").await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStorage::new(dir.path());
        let path = store.entry_path("data-v2", "k").unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{not json\nbody").unwrap();

        assert!(matches!(store.get("data-v2", "k").await, Err(StorageError::Corrupt(_))));
        // Listing skips it instead of failing
        assert!(store.keys("data-v2").await.unwrap().is_empty());
    }
}
