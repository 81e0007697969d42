//! Worker lifecycle: install, activate, supersede.
//!
//! Install pre-populates the shell and content partitions (and creates the
//! image partition empty), then asks to skip the waiting phase. Activate
//! deletes every partition outside the current version set and takes over
//! all open page clients at once.
//!
//! States: Parsed -> Installing -> Waiting -> Activating -> Active, with
//! Redundant reachable from anywhere once a newer worker replaces this one.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};
use url::Url;

use crate::cache::{CacheManager, PartitionHandle, PartitionRole};
use crate::config::{TimeoutConfig, WorkerConfig};
use crate::error::{LifecycleError, StorageResult};
use crate::http::{Request, Response, OFFLINE_PAGE_HTML};
use crate::network::{with_deadline, Network};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Parsed,
    Installing,
    Waiting,
    Activating,
    Active,
    Redundant,
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Bulk population
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateReport {
    pub shell_stored: usize,
    pub content_stored: usize,
    /// Files that could not be fetched or stored
    pub failed: Vec<String>,
}

impl PopulateReport {
    pub fn stored(&self) -> usize {
        self.shell_stored + self.content_stored
    }

    pub fn attempted(&self) -> usize {
        self.stored() + self.failed.len()
    }
}

/// Fetches the shell and chapter file lists into their partitions.
/// Used at install time and by the admin `UPDATE_CACHE` command.
pub struct Precacher {
    scope: Url,
    cache: CacheManager,
    network: Arc<dyn Network>,
    shell_files: Vec<String>,
    content_files: Vec<String>,
    offline_page: String,
    timeouts: TimeoutConfig,
    concurrency: usize,
}

impl Precacher {
    pub fn new(scope: Url, config: &WorkerConfig, cache: CacheManager, network: Arc<dyn Network>) -> Self {
        Self {
            scope,
            cache,
            network,
            shell_files: config.shell_files.clone(),
            content_files: config.content_files(),
            offline_page: config.offline_page.clone(),
            timeouts: config.timeouts.clone(),
            concurrency: config.precache_concurrency.max(1),
        }
    }

    /// Fetch every listed file. Individual failures are logged and reported,
    /// never fatal; only failing to open a partition aborts.
    pub async fn populate(&self) -> StorageResult<PopulateReport> {
        let shell = self.cache.open_partition(PartitionRole::Shell).await?;
        let content = self.cache.open_partition(PartitionRole::Content).await?;

        self.store_offline_page(&shell).await;

        let (shell_stored, mut failed) = self
            .populate_partition(&shell, &self.shell_files, self.timeouts.shell())
            .await;
        let (content_stored, content_failed) = self
            .populate_partition(&content, &self.content_files, self.timeouts.content())
            .await;
        failed.extend(content_failed);
        failed.sort();

        let report = PopulateReport {
            shell_stored,
            content_stored,
            failed,
        };
        info!(
            shell = report.shell_stored,
            content = report.content_stored,
            failed = report.failed.len(),
            "Bulk population finished"
        );
        Ok(report)
    }

    async fn store_offline_page(&self, shell: &PartitionHandle) {
        let key = match Request::get(&self.scope, &self.offline_page) {
            Ok(request) => request.key().to_string(),
            Err(e) => {
                warn!(error = %e, "Invalid offline page path");
                return;
            }
        };
        if let Err(e) = self
            .cache
            .put(shell, &key, &Response::offline_page(OFFLINE_PAGE_HTML))
            .await
        {
            warn!(error = %e, "Failed to store offline page");
        }
    }

    async fn populate_partition(
        &self,
        handle: &PartitionHandle,
        files: &[String],
        timeout: Duration,
    ) -> (usize, Vec<String>) {
        let outcomes: Vec<(String, anyhow::Result<()>)> = stream::iter(files.iter().cloned())
            .map(|file| async move {
                let outcome = self.fetch_and_store(handle, &file, timeout).await;
                (file, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut stored = 0;
        let mut failed = Vec::new();
        for (file, outcome) in outcomes {
            match outcome {
                Ok(()) => stored += 1,
                Err(e) => {
                    warn!(file = %file, partition = handle.name(), error = %e, "Failed to pre-populate file");
                    failed.push(file);
                }
            }
        }
        (stored, failed)
    }

    async fn fetch_and_store(&self, handle: &PartitionHandle, file: &str, timeout: Duration) -> anyhow::Result<()> {
        let request = Request::get(&self.scope, file)?;
        let response = with_deadline(self.network.fetch(&request), timeout, None)
            .await
            .with_context(|| format!("Failed to fetch {}", request.key()))?;
        if !response.is_ok() {
            bail!("{} returned status {}", request.key(), response.status);
        }
        self.cache
            .put(handle, request.key(), &response)
            .await
            .with_context(|| format!("Failed to store {}", request.key()))?;
        Ok(())
    }
}

// ============================================================================
// Page clients
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

/// Open pages and the worker version controlling each (if any).
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<BTreeMap<ClientId, Option<String>>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A newly opened page starts uncontrolled.
    pub fn register(&self) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.clients.write().insert(id, None);
        id
    }

    pub fn unregister(&self, id: ClientId) -> bool {
        self.clients.write().remove(&id).is_some()
    }

    pub fn controller(&self, id: ClientId) -> Option<String> {
        self.clients.read().get(&id).cloned().flatten()
    }

    /// Make `version` the controller of every open page. Returns how many
    /// pages changed controller.
    pub fn claim(&self, version: &str) -> usize {
        let mut clients = self.clients.write();
        let mut changed = 0;
        for controller in clients.values_mut() {
            if controller.as_deref() != Some(version) {
                *controller = Some(version.to_string());
                changed += 1;
            }
        }
        changed
    }

    pub fn controlled_by(&self, version: &str) -> usize {
        self.clients
            .read()
            .values()
            .filter(|c| c.as_deref() == Some(version))
            .count()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub populated: PopulateReport,
    /// Always set: a new worker never waits for old pages to close
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    pub deleted: Vec<String>,
    pub claimed: usize,
}

pub struct LifecycleManager {
    state: Mutex<LifecycleState>,
    cache: CacheManager,
    precacher: Arc<Precacher>,
    clients: Arc<ClientRegistry>,
}

impl LifecycleManager {
    pub fn new(cache: CacheManager, precacher: Arc<Precacher>, clients: Arc<ClientRegistry>) -> Self {
        Self {
            state: Mutex::new(LifecycleState::Parsed),
            cache,
            precacher,
            clients,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    fn transition(&self, from: &[LifecycleState], to: LifecycleState) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        if !from.contains(&state) {
            return Err(LifecycleError::InvalidTransition {
                from: state.name(),
                to: to.name(),
            });
        }
        *state = to;
        Ok(())
    }

    pub async fn install(&self) -> Result<InstallReport, LifecycleError> {
        self.transition(&[LifecycleState::Parsed], LifecycleState::Installing)?;
        info!(version = self.cache.version(), "Installing");

        let result = async {
            for role in PartitionRole::ALL {
                self.cache.open_partition(role).await?;
            }
            self.precacher.populate().await
        }
        .await;

        match result {
            Ok(populated) => {
                // A supersede while populating wins over the install result
                self.transition(&[LifecycleState::Installing], LifecycleState::Waiting)?;
                Ok(InstallReport {
                    populated,
                    skip_waiting: true,
                })
            }
            Err(e) => {
                error!(error = %e, "Install failed");
                let _ = self.transition(&[LifecycleState::Installing], LifecycleState::Redundant);
                Err(e.into())
            }
        }
    }

    pub async fn activate(&self) -> Result<ActivateReport, LifecycleError> {
        self.transition(&[LifecycleState::Waiting], LifecycleState::Activating)?;

        let current = self.cache.current_names();
        let deleted = match self.cache.delete_stale_partitions(&current).await {
            Ok(deleted) => deleted,
            Err(e) => {
                error!(error = %e, "Stale partition cleanup failed");
                let _ = self.transition(&[LifecycleState::Activating], LifecycleState::Waiting);
                return Err(e.into());
            }
        };
        self.transition(&[LifecycleState::Activating], LifecycleState::Active)?;
        let claimed = self.clients.claim(self.cache.version());
        info!(
            version = self.cache.version(),
            deleted = deleted.len(),
            claimed,
            "Activated"
        );
        Ok(ActivateReport { deleted, claimed })
    }

    /// A newer worker took over.
    pub fn supersede(&self) {
        info!(version = self.cache.version(), "Superseded");
        *self.state.lock() = LifecycleState::Redundant;
    }
}
