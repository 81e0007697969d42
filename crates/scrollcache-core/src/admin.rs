//! `CACHE_MANAGEMENT` admin protocol.
//!
//! The foreground page posts `{"type": "CACHE_MANAGEMENT", "action": ...}`
//! together with a reply port; the worker answers with an [`AdminReply`].
//! Every failure, including malformed input, becomes `{"success": false}`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::error::ProtocolError;
use crate::lifecycle::Precacher;

pub const MESSAGE_TYPE: &str = "CACHE_MANAGEMENT";

/// Raw inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AdminRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub action: String,
}

impl AdminRequest {
    pub fn new(command: AdminCommand) -> Self {
        Self {
            kind: MESSAGE_TYPE.to_string(),
            action: command.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    ClearCache,
    UpdateCache,
    GetCacheSize,
}

impl AdminCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminCommand::ClearCache => "CLEAR_CACHE",
            AdminCommand::UpdateCache => "UPDATE_CACHE",
            AdminCommand::GetCacheSize => "GET_CACHE_SIZE",
        }
    }
}

impl fmt::Display for AdminCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminCommand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLEAR_CACHE" => Ok(AdminCommand::ClearCache),
            "UPDATE_CACHE" => Ok(AdminCommand::UpdateCache),
            "GET_CACHE_SIZE" => Ok(AdminCommand::GetCacheSize),
            other => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AdminReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Total entry count across all partitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl AdminReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            size: None,
        }
    }

    pub fn size(size: u64) -> Self {
        Self {
            success: true,
            message: None,
            size: Some(size),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            size: None,
        }
    }
}

/// A message as delivered to the worker: payload plus optional reply port.
#[derive(Debug)]
pub struct AdminMessage {
    pub payload: serde_json::Value,
    pub reply: Option<oneshot::Sender<AdminReply>>,
}

impl AdminMessage {
    pub fn new(payload: serde_json::Value) -> (Self, oneshot::Receiver<AdminReply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                payload,
                reply: Some(tx),
            },
            rx,
        )
    }

    pub fn command(command: AdminCommand) -> (Self, oneshot::Receiver<AdminReply>) {
        let payload = serde_json::json!({ "type": MESSAGE_TYPE, "action": command.as_str() });
        Self::new(payload)
    }
}

pub struct AdminChannel {
    cache: CacheManager,
    precacher: Arc<Precacher>,
}

impl AdminChannel {
    pub fn new(cache: CacheManager, precacher: Arc<Precacher>) -> Self {
        Self { cache, precacher }
    }

    pub fn parse(payload: &serde_json::Value) -> Result<AdminCommand, ProtocolError> {
        let request = AdminRequest::deserialize(payload)?;
        if request.kind != MESSAGE_TYPE {
            return Err(ProtocolError::UnsupportedType(request.kind));
        }
        request.action.parse()
    }

    pub async fn execute(&self, command: AdminCommand) -> AdminReply {
        info!(action = %command, "Admin command");
        match command {
            AdminCommand::ClearCache => match self.cache.clear_all().await {
                Ok(deleted) => {
                    debug!(deleted, "Cleared partitions");
                    AdminReply::ok("cache cleared")
                }
                Err(e) => {
                    warn!(error = %e, "Failed to clear cache");
                    AdminReply::failure(e.to_string())
                }
            },
            AdminCommand::UpdateCache => match self.precacher.populate().await {
                Ok(report) => AdminReply::ok(format!(
                    "refreshed {} of {} entries",
                    report.stored(),
                    report.attempted()
                )),
                Err(e) => {
                    warn!(error = %e, "Failed to refresh cache");
                    AdminReply::failure(e.to_string())
                }
            },
            AdminCommand::GetCacheSize => match self.cache.size_of().await {
                Ok(size) => AdminReply::size(size),
                Err(e) => {
                    warn!(error = %e, "Failed to measure cache");
                    AdminReply::failure(e.to_string())
                }
            },
        }
    }

    pub async fn handle(&self, payload: &serde_json::Value) -> AdminReply {
        match Self::parse(payload) {
            Ok(command) => self.execute(command).await,
            Err(e) => {
                warn!(error = %e, "Rejected admin message");
                AdminReply::failure(e.to_string())
            }
        }
    }

    pub async fn handle_json(&self, raw: &str) -> AdminReply {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(payload) => self.handle(&payload).await,
            Err(e) => AdminReply::failure(ProtocolError::from(e).to_string()),
        }
    }

    /// Handle a message and post the reply on its port, if it has one.
    pub async fn dispatch(&self, message: AdminMessage) {
        let reply = self.handle(&message.payload).await;
        if let Some(port) = message.reply {
            if port.send(reply).is_err() {
                debug!("Admin reply port closed before reply");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStorage;
    use crate::catalog::Book;
    use crate::config::WorkerConfig;
    use crate::http::Request;
    use crate::interceptor::FetchInterceptor;
    use crate::network::Network;
    use crate::testing::{scope, StubNetwork, SCOPE};
    use serde_json::json;

    fn config() -> WorkerConfig {
        WorkerConfig {
            scope: SCOPE.to_string(),
            shell_files: vec![
                "./".into(),
                "./index.html".into(),
                "./style.css".into(),
                "./app.js".into(),
                "./manifest.json".into(),
            ],
            books: vec![Book::new("rev", "Revelation", "Rev", "R", 3)],
            ..WorkerConfig::default()
        }
    }

    fn network() -> Arc<StubNetwork> {
        let network = Arc::new(StubNetwork::new());
        for path in ["./", "index.html", "style.css", "app.js", "manifest.json"] {
            network.route(path, "shell");
        }
        network
    }

    fn channel(network: Arc<StubNetwork>) -> (AdminChannel, CacheManager, Arc<Precacher>) {
        let config = config();
        let cache = CacheManager::new(Arc::new(MemoryStorage::new()), &config);
        let network: Arc<dyn Network> = network;
        let precacher = Arc::new(Precacher::new(scope(), &config, cache.clone(), network));
        (AdminChannel::new(cache.clone(), precacher.clone()), cache, precacher)
    }

    #[test]
    fn test_parse() {
        let command = AdminChannel::parse(&json!({"type": "CACHE_MANAGEMENT", "action": "GET_CACHE_SIZE"}));
        assert_eq!(command.unwrap(), AdminCommand::GetCacheSize);

        let err = AdminChannel::parse(&json!({"type": "CACHE_MANAGEMENT", "action": "EXPLODE"})).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownAction(a) if a == "EXPLODE"));

        let err = AdminChannel::parse(&json!({"type": "PUSH", "action": "CLEAR_CACHE"})).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedType(_)));

        let err = AdminChannel::parse(&json!({"action": "CLEAR_CACHE"})).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_reply_wire_format() {
        let size = serde_json::to_value(AdminReply::size(8)).unwrap();
        assert_eq!(size, json!({"success": true, "size": 8}));

        let failure = serde_json::to_value(AdminReply::failure("nope")).unwrap();
        assert_eq!(failure, json!({"success": false, "message": "nope"}));

        let request = serde_json::to_value(AdminRequest::new(AdminCommand::ClearCache)).unwrap();
        assert_eq!(request, json!({"type": "CACHE_MANAGEMENT", "action": "CLEAR_CACHE"}));
    }

    #[tokio::test]
    async fn test_size_counts_precache_and_content_fetches() {
        let network = network();
        let (channel, cache, precacher) = channel(network.clone());

        // Chapters are unrouted during precache, so only the shell lands
        let populated = precacher.populate().await.unwrap();
        assert_eq!(populated.shell_stored, 5);
        assert_eq!(populated.content_stored, 0);

        for n in 1..=3 {
            network.route(&format!("data/Rev/R-chapter{}.txt", n), "text");
        }
        let interceptor = FetchInterceptor::new(scope(), &config(), cache.clone(), network).unwrap();
        for n in 1..=3 {
            let request = Request::get(&scope(), &format!("data/Rev/R-chapter{}.txt", n)).unwrap();
            assert!(interceptor.handle(&request).await.is_ok());
        }

        let reply = channel
            .handle(&json!({"type": "CACHE_MANAGEMENT", "action": "GET_CACHE_SIZE"}))
            .await;
        assert!(reply.success);
        assert!(reply.size.unwrap() >= 8);
    }

    #[tokio::test]
    async fn test_clear_then_size_is_zero() {
        let (channel, _, precacher) = channel(network());
        precacher.populate().await.unwrap();

        let reply = channel.execute(AdminCommand::ClearCache).await;
        assert_eq!(reply, AdminReply::ok("cache cleared"));
        assert_eq!(channel.execute(AdminCommand::GetCacheSize).await, AdminReply::size(0));
    }

    #[tokio::test]
    async fn test_update_reports_refreshed_entries() {
        // Chapters are not routed, so only the five shell files succeed
        let (channel, _, _) = channel(network());
        let reply = channel.execute(AdminCommand::UpdateCache).await;
        assert_eq!(reply, AdminReply::ok("refreshed 5 of 8 entries"));
    }

    #[tokio::test]
    async fn test_malformed_json_replies_failure() {
        let (channel, _, _) = channel(network());
        let reply = channel.handle_json("{not json").await;
        assert!(!reply.success);
        assert!(reply.message.unwrap().starts_with("Malformed admin message"));
    }

    #[tokio::test]
    async fn test_dispatch_posts_reply_on_port() {
        let (channel, _, _) = channel(network());
        let (message, reply) = AdminMessage::command(AdminCommand::GetCacheSize);
        channel.dispatch(message).await;
        assert_eq!(reply.await.unwrap(), AdminReply::size(0));

        let (message, reply) = AdminMessage::new(json!({"type": "CACHE_MANAGEMENT", "action": "NOPE"}));
        channel.dispatch(message).await;
        let reply = reply.await.unwrap();
        assert!(!reply.success);
    }
}
