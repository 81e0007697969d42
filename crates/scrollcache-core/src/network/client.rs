//! HTTP implementation of the `Network` trait.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::debug;

use crate::error::NetworkError;
use crate::http::{Request, Response, ResponseSource};
use crate::network::Network;

/// Only connecting is bounded here. GET deadlines are applied per class by the
/// interceptor and non-GET requests run until the page gives up.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Response headers worth keeping alongside a cached body.
const KEPT_HEADERS: &[&str] = &[
    "content-type",
    "content-language",
    "etag",
    "last-modified",
    "cache-control",
];

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self, NetworkError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("scrollcache/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let method = Method::from_bytes(request.method().as_bytes())
            .map_err(|e| NetworkError::InvalidUrl(format!("bad method {}: {}", request.method(), e)))?;

        let mut builder = self.client.request(method, request.url().clone());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body().is_empty() {
            builder = builder.body(request.body().clone());
        }
        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = KEPT_HEADERS
            .iter()
            .filter_map(|name| {
                response
                    .headers()
                    .get(*name)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        debug!(url = %request.url(), status, bytes = body.len(), "Network response");
        Ok(Response {
            status,
            headers,
            body,
            source: ResponseSource::Network,
        })
    }
}
