//! Network access seam.
//!
//! The interceptor only talks to the network through the `Network` trait,
//! so the hosting runtime decides how requests actually leave the process:
//!
//! - `HttpNetwork`: reqwest client with a shared connection pool
//! - `OfflineNetwork`: every request fails, for offline operation and tests
//!
//! `with_deadline` bounds any network future by a timeout and an optional
//! cancellation token; `with_cancel` honours only the token.

pub mod client;
pub mod deadline;

use async_trait::async_trait;

use crate::error::NetworkError;
use crate::http::{Request, Response};

pub use client::HttpNetwork;
pub use deadline::{with_cancel, with_deadline};

#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request. A response with an error status is still `Ok`;
    /// only transport-level failures are errors.
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// A network that is never reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineNetwork;

#[async_trait]
impl Network for OfflineNetwork {
    async fn fetch(&self, _request: &Request) -> Result<Response, NetworkError> {
        Err(NetworkError::transport("offline"))
    }
}
