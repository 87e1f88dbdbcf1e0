//! Transport trait: the protocol client the bot talks through.
//!
//! Implementations own login, sync and the raw HTTP/socket calls. The bot
//! never calls `execute` outside the outbound worker, apart from presence
//! changes before the worker starts and after it stops.

use async_trait::async_trait;
use futures::stream::Stream;

use crate::error::Result;
use crate::types::{DeviceId, OutboundAction, SyncItem, UserId};

/// Boxed inbound sync stream.
pub type SyncStream = Box<dyn Stream<Item = SyncItem> + Send + Unpin>;

/// Password login request.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    /// Previously issued device id; reusing it keeps the session identity stable.
    pub device_id: Option<DeviceId>,
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub device_id: DeviceId,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logs.
    fn name(&self) -> &str;

    /// Log in. Fails with `AuthenticationFailed` when the server refuses.
    async fn login(&self, credentials: &Credentials) -> Result<Session>;

    /// Start syncing from `since` (or from scratch) and stream what arrives.
    async fn listen(&self, since: Option<String>) -> Result<SyncStream>;

    /// Perform one outbound call. Fails with `RateLimited` when throttled.
    async fn execute(&self, action: &OutboundAction) -> Result<()>;
}
