//! scrollcache core - offline caching layer for a two-book chapter reader.
//!
//! The crate is organised leaf first:
//!
//! - `classify`: maps a request path to a `ResourceClass`
//! - `cache`: versioned partitions over a pluggable `CacheStorage`
//! - `network`: the `Network` seam plus the deadline/cancellation helper
//! - `interceptor`: per-class fetch policies (network-first, cache-first)
//! - `lifecycle`: install/activate, stale partition cleanup, client takeover
//! - `admin`: the `CACHE_MANAGEMENT` message protocol
//! - `worker`: one facade exposing a method per lifecycle event
//! - `reader`: the foreground chapter reader built on top of the worker

pub mod admin;
pub mod cache;
pub mod catalog;
pub mod classify;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod lifecycle;
pub mod network;
pub mod reader;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use admin::{AdminChannel, AdminCommand, AdminMessage, AdminReply, AdminRequest, MESSAGE_TYPE};
pub use cache::{CacheEntry, CacheManager, CacheStorage, DiskStorage, MemoryStorage, PartitionHandle, PartitionRole};
pub use catalog::{find_book, Book};
pub use classify::{classify, ResourceClass};
pub use clock::{Clock, SystemClock};
pub use config::WorkerConfig;
pub use error::{Error, LifecycleError, NetworkError, ProtocolError, ReaderError, StorageError};
pub use http::{Request, RequestMode, Response, ResponseSource};
pub use interceptor::FetchInterceptor;
pub use lifecycle::{
    ActivateReport, ClientId, ClientRegistry, InstallReport, LifecycleManager, LifecycleState, PopulateReport, Precacher,
};
pub use network::{HttpNetwork, Network, OfflineNetwork};
pub use reader::{ChapterView, Reader};
pub use worker::{ServiceWorker, WorkerEvent};
