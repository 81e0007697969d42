//! Fetch interceptor: picks a cache policy per resource class.
//!
//! | class   | policy                                         | terminal fallback          |
//! |---------|------------------------------------------------|----------------------------|
//! | Content | network-first, bounded; cache on failure       | offline text (status 200)  |
//! | Image   | cache-first + background refresh               | placeholder image          |
//! | Shell   | cache-first + background refresh               | offline page (navigations) |
//! | Other   | network only, never cached                     | offline page or 503        |
//!
//! Requests outside the scope are never Shell. Non-GET requests go straight
//! to the network with their body and headers and no deadline.
//!
//! Every GET network attempt is time-bounded and a timeout, a transport error,
//! a cancelled request and an unsuccessful status are all handled the same
//! way: fall through to the next source. Nothing here returns an error.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheManager, PartitionHandle, PartitionRole};
use crate::classify::{Classifier, ResourceClass};
use crate::config::{TimeoutConfig, WorkerConfig};
use crate::error::NetworkError;
use crate::http::{Request, Response, OFFLINE_PAGE_HTML};
use crate::network::{with_cancel, with_deadline, Network};

pub struct FetchInterceptor {
    scope: Url,
    classifier: Classifier,
    cache: CacheManager,
    network: Arc<dyn Network>,
    timeouts: TimeoutConfig,
    /// Cache key of the offline fallback document
    offline_page_key: String,
    refreshes: TaskTracker,
}

impl FetchInterceptor {
    pub fn new(
        scope: Url,
        config: &WorkerConfig,
        cache: CacheManager,
        network: Arc<dyn Network>,
    ) -> Result<Self, NetworkError> {
        let offline_page_key = Request::get(&scope, &config.offline_page)?.key().to_string();
        Ok(Self {
            classifier: Classifier::from_config(config, &scope),
            scope,
            cache,
            network,
            timeouts: config.timeouts.clone(),
            offline_page_key,
            refreshes: TaskTracker::new(),
        })
    }

    pub fn offline_page_key(&self) -> &str {
        &self.offline_page_key
    }

    pub fn classify(&self, request: &Request) -> ResourceClass {
        match request.scope_path(&self.scope) {
            Some(path) => self.classifier.classify(&path, request.destination()),
            None => self
                .classifier
                .classify_out_of_scope(request.url().path(), request.destination()),
        }
    }

    pub async fn handle(&self, request: &Request) -> Response {
        self.handle_with_signal(request, None).await
    }

    /// Handle a request that the page may abort through `cancel`.
    /// Cancellation counts as a network failure.
    pub async fn handle_with_signal(&self, request: &Request, cancel: Option<&CancellationToken>) -> Response {
        if !request.is_get() {
            return self.pass_through(request, cancel).await;
        }

        let class = self.classify(request);
        debug!(key = request.key(), class = %class, "Intercepted request");
        match PartitionRole::for_class(class) {
            Some(PartitionRole::Content) => {
                self.network_first(request, PartitionRole::Content, self.timeouts.content(), cancel)
                    .await
            }
            Some(role) => self.cache_first(request, role, self.timeout_for(role), cancel).await,
            None => self.network_only(request, cancel).await,
        }
    }

    fn timeout_for(&self, role: PartitionRole) -> Duration {
        match role {
            PartitionRole::Shell => self.timeouts.shell(),
            PartitionRole::Content => self.timeouts.content(),
            PartitionRole::Image => self.timeouts.image(),
        }
    }

    /// Wait until every background refresh spawned so far has finished.
    pub async fn settle(&self) {
        self.refreshes.close();
        self.refreshes.wait().await;
        self.refreshes.reopen();
    }

    async fn network_first(
        &self,
        request: &Request,
        role: PartitionRole,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Response {
        let key = request.key();
        let handle = self.open(role).await;

        match self.fetch_bounded(request, timeout, cancel).await {
            Ok(response) if response.is_ok() => {
                if let Some(handle) = &handle {
                    self.store(handle, key, &response).await;
                }
                return response;
            }
            Ok(response) => debug!(key, status = response.status, "Unsuccessful status, trying cache"),
            Err(e) => debug!(key, error = %e, "Network failed, trying cache"),
        }

        if let Some(cached) = self.lookup(handle.as_ref(), key).await {
            debug!(key, "Serving cached content");
            return cached;
        }

        info!(key, "Content unavailable offline");
        Response::offline_text()
    }

    async fn cache_first(
        &self,
        request: &Request,
        role: PartitionRole,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Response {
        let key = request.key();
        let handle = self.open(role).await;

        if let Some(cached) = self.lookup(handle.as_ref(), key).await {
            if let Some(handle) = handle {
                self.spawn_refresh(handle, request.clone(), timeout);
            }
            debug!(key, role = %role, "Cache hit");
            return cached;
        }

        let failed = match self.fetch_bounded(request, timeout, cancel).await {
            Ok(response) if response.is_ok() => {
                if let Some(handle) = &handle {
                    self.store(handle, key, &response).await;
                }
                return response;
            }
            Ok(response) => {
                debug!(key, status = response.status, "Unsuccessful status on cache miss");
                Some(response)
            }
            Err(e) => {
                debug!(key, error = %e, "Network failed on cache miss");
                None
            }
        };

        match self.cache.match_any(key).await {
            Ok(Some(found)) => return found,
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "Fallback cache lookup failed"),
        }

        match role {
            PartitionRole::Image => Response::placeholder_image(),
            _ if request.is_navigation() => self.offline_page().await,
            _ => failed.unwrap_or_else(Response::service_unavailable),
        }
    }

    async fn network_only(&self, request: &Request, cancel: Option<&CancellationToken>) -> Response {
        match self.fetch_bounded(request, self.timeouts.other(), cancel).await {
            Ok(response) => response,
            Err(e) if request.is_navigation() => {
                debug!(key = request.key(), error = %e, "Navigation failed, serving offline page");
                self.offline_page().await
            }
            Err(e) => {
                debug!(key = request.key(), error = %e, "Uncached request failed");
                Response::service_unavailable()
            }
        }
    }

    /// Forward a non-GET request untouched. Only the page's own abort stops it.
    async fn pass_through(&self, request: &Request, cancel: Option<&CancellationToken>) -> Response {
        match with_cancel(self.network.fetch(request), cancel).await {
            Ok(response) => response,
            Err(e) => {
                debug!(method = request.method(), key = request.key(), error = %e, "Pass-through request failed");
                Response::service_unavailable()
            }
        }
    }

    async fn fetch_bounded(
        &self,
        request: &Request,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Response, NetworkError> {
        with_deadline(self.network.fetch(request), timeout, cancel).await
    }

    /// Refresh a cache entry without holding up the response already served.
    /// Failures are dropped.
    fn spawn_refresh(&self, handle: PartitionHandle, request: Request, timeout: Duration) {
        let cache = self.cache.clone();
        let network = Arc::clone(&self.network);
        self.refreshes.spawn(async move {
            let key = request.key();
            match with_deadline(network.fetch(&request), timeout, None).await {
                Ok(response) if response.is_ok() => {
                    if let Err(e) = cache.put(&handle, key, &response).await {
                        debug!(key, error = %e, "Background refresh could not store response");
                    } else {
                        debug!(key, "Background refresh stored");
                    }
                }
                Ok(response) => debug!(key, status = response.status, "Background refresh got unsuccessful status"),
                Err(e) => debug!(key, error = %e, "Background refresh failed"),
            }
        });
    }

    /// Open a partition; a storage failure degrades to network-only.
    async fn open(&self, role: PartitionRole) -> Option<PartitionHandle> {
        match self.cache.open_partition(role).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(role = %role, error = %e, "Partition unavailable, continuing without cache");
                None
            }
        }
    }

    async fn lookup(&self, handle: Option<&PartitionHandle>, key: &str) -> Option<Response> {
        let handle = handle?;
        match self.cache.match_key(handle, key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(key, partition = handle.name(), error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn store(&self, handle: &PartitionHandle, key: &str, response: &Response) {
        if let Err(e) = self.cache.put(handle, key, response).await {
            warn!(key, partition = handle.name(), error = %e, "Cache write failed, serving uncached");
        }
    }

    /// The installed offline document, or the built-in copy if it is missing.
    async fn offline_page(&self) -> Response {
        match self.cache.match_any(&self.offline_page_key).await {
            Ok(Some(page)) => page,
            Ok(None) => Response::offline_page(OFFLINE_PAGE_HTML),
            Err(e) => {
                warn!(error = %e, "Offline page lookup failed");
                Response::offline_page(OFFLINE_PAGE_HTML)
            }
        }
    }
}
