//! The worker facade: one method per lifecycle event, plus a tokio event
//! loop that feeds events from a channel into independent tasks.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use url::Url;

use crate::admin::{AdminChannel, AdminMessage, AdminReply};
use crate::cache::{CacheManager, CacheStorage};
use crate::clock::{Clock, SystemClock};
use crate::config::WorkerConfig;
use crate::error::LifecycleError;
use crate::http::{Request, Response};
use crate::interceptor::FetchInterceptor;
use crate::lifecycle::{ActivateReport, ClientRegistry, InstallReport, LifecycleManager, LifecycleState, Precacher};
use crate::network::Network;

/// Events delivered by the hosting runtime.
#[derive(Debug)]
pub enum WorkerEvent {
    Install {
        reply: Option<oneshot::Sender<Result<InstallReport, LifecycleError>>>,
    },
    Activate {
        reply: Option<oneshot::Sender<Result<ActivateReport, LifecycleError>>>,
    },
    Fetch {
        request: Request,
        cancel: Option<CancellationToken>,
        reply: oneshot::Sender<Response>,
    },
    Message(AdminMessage),
}

impl WorkerEvent {
    pub fn fetch(request: Request) -> (Self, oneshot::Receiver<Response>) {
        let (reply, rx) = oneshot::channel();
        (
            WorkerEvent::Fetch {
                request,
                cancel: None,
                reply,
            },
            rx,
        )
    }

    fn name(&self) -> &'static str {
        match self {
            WorkerEvent::Install { .. } => "install",
            WorkerEvent::Activate { .. } => "activate",
            WorkerEvent::Fetch { .. } => "fetch",
            WorkerEvent::Message(_) => "message",
        }
    }
}

pub struct ServiceWorker {
    config: WorkerConfig,
    scope: Url,
    cache: CacheManager,
    interceptor: FetchInterceptor,
    lifecycle: LifecycleManager,
    admin: AdminChannel,
    clients: Arc<ClientRegistry>,
}

impl ServiceWorker {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> anyhow::Result<Self> {
        Self::with_clock(config, storage, network, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let scope = config.scope_url()?;
        let cache = CacheManager::new(storage, &config).with_clock(clock);
        let precacher = Arc::new(Precacher::new(
            scope.clone(),
            &config,
            cache.clone(),
            Arc::clone(&network),
        ));
        let clients = Arc::new(ClientRegistry::new());
        let interceptor = FetchInterceptor::new(scope.clone(), &config, cache.clone(), network)?;
        let lifecycle = LifecycleManager::new(cache.clone(), Arc::clone(&precacher), Arc::clone(&clients));
        let admin = AdminChannel::new(cache.clone(), precacher);

        Ok(Self {
            config,
            scope,
            cache,
            interceptor,
            lifecycle,
            admin,
            clients,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub async fn install(&self) -> Result<InstallReport, LifecycleError> {
        self.lifecycle.install().await
    }

    pub async fn activate(&self) -> Result<ActivateReport, LifecycleError> {
        self.lifecycle.activate().await
    }

    /// Install, then activate straight away (the worker always skips waiting).
    pub async fn install_and_activate(&self) -> Result<(InstallReport, ActivateReport), LifecycleError> {
        let installed = self.install().await?;
        let activated = self.activate().await?;
        Ok((installed, activated))
    }

    pub fn supersede(&self) {
        self.lifecycle.supersede();
    }

    pub async fn fetch(&self, request: &Request) -> Response {
        self.interceptor.handle(request).await
    }

    pub async fn fetch_with_signal(&self, request: &Request, cancel: &CancellationToken) -> Response {
        self.interceptor.handle_with_signal(request, Some(cancel)).await
    }

    /// Handle an admin message, posting the reply on its port.
    pub async fn message(&self, message: AdminMessage) {
        self.admin.dispatch(message).await;
    }

    /// Handle an admin payload and return the reply directly.
    pub async fn admin(&self, payload: &serde_json::Value) -> AdminReply {
        self.admin.handle(payload).await
    }

    /// Wait for background cache refreshes to finish.
    pub async fn settle(&self) {
        self.interceptor.settle().await;
    }

    /// Serve events until the sender side closes, then wait for every
    /// in-flight event. Each event runs in its own task.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<WorkerEvent>) {
        let tasks = TaskTracker::new();
        while let Some(event) = events.recv().await {
            let worker = Arc::clone(&self);
            debug!(event = event.name(), "Worker event");
            tasks.spawn(async move { worker.dispatch(event).await });
        }
        tasks.close();
        tasks.wait().await;
        info!("Worker event loop stopped");
    }

    async fn dispatch(&self, event: WorkerEvent) {
        match event {
            WorkerEvent::Install { reply } => {
                let result = self.install().await;
                if let Some(reply) = reply {
                    if reply.send(result).is_err() {
                        debug!("Install reply dropped");
                    }
                }
            }
            WorkerEvent::Activate { reply } => {
                let result = self.activate().await;
                if let Some(reply) = reply {
                    if reply.send(result).is_err() {
                        debug!("Activate reply dropped");
                    }
                }
            }
            WorkerEvent::Fetch { request, cancel, reply } => {
                let response = self.interceptor.handle_with_signal(&request, cancel.as_ref()).await;
                if reply.send(response).is_err() {
                    warn!(key = request.key(), "Page went away before response");
                }
            }
            WorkerEvent::Message(message) => self.message(message).await,
        }
    }
}
