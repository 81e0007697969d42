//! Worker configuration.
//!
//! Everything the worker needs to know about the application it caches:
//! the scope it serves, the cache version, the partition names, the shell
//! file list, the book catalog and the network time bounds.
//!
//! Configuration is stored at `~/.config/scrollcache/config.json`; any field
//! missing from the file takes its default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::catalog::Book;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "scrollcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Cache version tag. Bumping it makes every existing partition stale.
const DEFAULT_CACHE_VERSION: &str = "v2";

/// Maximum concurrent network requests while bulk-populating partitions.
/// 10 keeps install quick without flooding a small static host.
const DEFAULT_PRECACHE_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Base URL every relative request path is resolved against
    pub scope: String,
    pub cache_version: String,
    pub partitions: PartitionNames,
    /// Files needed to boot the UI, relative to `scope`
    pub shell_files: Vec<String>,
    /// Key under which the offline fallback document is stored
    pub offline_page: String,
    pub books: Vec<Book>,
    pub timeouts: TimeoutConfig,
    pub precache_concurrency: usize,
    /// Optional storage cap in bytes across all partitions. Memory storage
    /// counts body bytes; disk storage counts whole entry files.
    pub storage_quota_bytes: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scope: "http://localhost:8080/".to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            partitions: PartitionNames::default(),
            shell_files: [
                "./",
                "./index.html",
                "./style.css",
                "./app.js",
                "./manifest.json",
                "./icons/icon-192.png",
                "./icons/icon-512.png",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            offline_page: "./offline.html".to_string(),
            books: vec![Book::revelation(), Book::isaiah()],
            timeouts: TimeoutConfig::default(),
            precache_concurrency: DEFAULT_PRECACHE_CONCURRENCY,
            storage_quota_bytes: None,
        }
    }
}

/// Name prefixes of the three partitions; the version tag is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionNames {
    pub shell: String,
    pub content: String,
    pub image: String,
}

impl Default for PartitionNames {
    fn default() -> Self {
        Self {
            shell: "shell".to_string(),
            content: "data".to_string(),
            image: "img".to_string(),
        }
    }
}

/// Network time bounds per resource class, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub content_ms: u64,
    pub image_ms: u64,
    pub shell_ms: u64,
    pub other_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            content_ms: 5_000,
            image_ms: 3_000,
            shell_ms: 3_000,
            other_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    pub fn content(&self) -> Duration {
        Duration::from_millis(self.content_ms)
    }

    pub fn image(&self) -> Duration {
        Duration::from_millis(self.image_ms)
    }

    pub fn shell(&self) -> Duration {
        Duration::from_millis(self.shell_ms)
    }

    pub fn other(&self) -> Duration {
        Duration::from_millis(self.other_ms)
    }
}

impl WorkerConfig {
    /// Load from the default location, falling back to defaults if absent.
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_path()?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.scope_url()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the on-disk partitions.
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Parsed scope. A scope without a trailing slash is treated as a directory.
    pub fn scope_url(&self) -> Result<Url> {
        let mut scope = self.scope.clone();
        if !scope.ends_with('/') {
            scope.push('/');
        }
        Url::parse(&scope).with_context(|| format!("Invalid scope URL: {}", self.scope))
    }

    /// Every chapter file of every book, in catalog order.
    pub fn content_files(&self) -> Vec<String> {
        self.books
            .iter()
            .flat_map(|book| book.chapter_paths())
            .collect()
    }
}
