//! Bot state backends and the multiplexer that composes them.

pub mod file;
pub mod memory;
pub mod sqlite;

pub use file::FileBotStorage;
pub use memory::MemoryBotStorage;
pub use sqlite::SqliteBotStorage;

use std::sync::Arc;

use herald_core::error::{HeraldError, Result};
use herald_core::traits::{BotStorage, RoomSnapshot};
use herald_core::types::{DeviceId, RoomId, UserId};

/// Fans writes out to every backend and reads from the first one.
///
/// A write stops at the first backend that fails; earlier backends keep what
/// they already stored.
pub struct MultiplexStorage {
    backends: Vec<Arc<dyn BotStorage>>,
}

impl MultiplexStorage {
    pub fn new(backends: Vec<Arc<dyn BotStorage>>) -> Result<Self> {
        if backends.is_empty() {
            return Err(HeraldError::config("multiplex storage needs at least one backend"));
        }
        Ok(Self { backends })
    }

    fn primary(&self) -> &dyn BotStorage {
        self.backends[0].as_ref()
    }

    fn each(&self, f: impl Fn(&dyn BotStorage) -> Result<()>) -> Result<()> {
        for backend in &self.backends {
            f(backend.as_ref())?;
        }
        Ok(())
    }
}

impl BotStorage for MultiplexStorage {
    fn load_device_id(&self) -> Result<Option<DeviceId>> {
        self.primary().load_device_id()
    }

    fn store_device_id(&self, device_id: &DeviceId) -> Result<()> {
        self.each(|s| s.store_device_id(device_id))
    }

    fn load_next_batch(&self, user: &UserId) -> Result<Option<String>> {
        self.primary().load_next_batch(user)
    }

    fn store_next_batch(&self, user: &UserId, token: &str) -> Result<()> {
        self.each(|s| s.store_next_batch(user, token))
    }

    fn load_filter_id(&self, user: &UserId) -> Result<Option<String>> {
        self.primary().load_filter_id(user)
    }

    fn store_filter_id(&self, user: &UserId, filter_id: &str) -> Result<()> {
        self.each(|s| s.store_filter_id(user, filter_id))
    }

    fn save_room(&self, room: &RoomSnapshot) -> Result<()> {
        self.each(|s| s.save_room(room))
    }

    fn load_room(&self, room: &RoomId) -> Result<Option<RoomSnapshot>> {
        self.primary().load_room(room)
    }
}
