//! Bot state persistence: device identity, sync cursor, filters, room snapshots.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{DeviceId, RoomId, UserId};

/// Cached room state a transport may want to persist between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: RoomId,
    #[serde(default)]
    pub members: Vec<UserId>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Narrow storage interface for bot session state.
///
/// Backends decide their own format. Operations a backend cannot express
/// return `HeraldError::Unsupported` instead of panicking.
pub trait BotStorage: Send + Sync {
    fn load_device_id(&self) -> Result<Option<DeviceId>>;
    fn store_device_id(&self, device_id: &DeviceId) -> Result<()>;

    fn load_next_batch(&self, user: &UserId) -> Result<Option<String>>;
    fn store_next_batch(&self, user: &UserId, token: &str) -> Result<()>;

    fn load_filter_id(&self, user: &UserId) -> Result<Option<String>>;
    fn store_filter_id(&self, user: &UserId, filter_id: &str) -> Result<()>;

    fn save_room(&self, room: &RoomSnapshot) -> Result<()>;
    fn load_room(&self, room: &RoomId) -> Result<Option<RoomSnapshot>>;
}
