//! Test doubles shared by the unit tests of several modules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use crate::error::NetworkError;
use crate::http::{Request, Response};
use crate::network::Network;

pub const SCOPE: &str = "https://reader.example.org/app/";

pub fn scope() -> Url {
    Url::parse(SCOPE).unwrap()
}

pub fn url(path: &str) -> String {
    scope().join(path).unwrap().to_string()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Scripted network: answers from a URL table, 404 for unknown URLs.
#[derive(Default)]
pub struct StubNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<Request>>,
}

impl StubNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 at `path` (relative to `SCOPE`).
    pub fn route(&self, path: &str, body: &str) -> &Self {
        self.route_response(path, Response::new(200, body.to_string()))
    }

    pub fn route_response(&self, path: &str, response: Response) -> &Self {
        self.routes.lock().insert(url(path), response);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<Request> {
        self.last_request.lock().clone()
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::transport("network disabled"));
        }
        Ok(self
            .routes
            .lock()
            .get(request.key())
            .cloned()
            .unwrap_or_else(|| Response::new(404, "Not Found")))
    }
}
