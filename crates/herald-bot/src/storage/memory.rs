//! In-process bot state. Forgets everything on exit; the only backend that
//! keeps room snapshots.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use herald_core::error::{HeraldError, Result};
use herald_core::traits::{BotStorage, RoomSnapshot};
use herald_core::types::{DeviceId, RoomId, UserId};

#[derive(Default)]
struct MemoryState {
    device_id: Option<DeviceId>,
    next_batch: HashMap<UserId, String>,
    filters: HashMap<UserId, String>,
    rooms: HashMap<RoomId, RoomSnapshot>,
}

#[derive(Default)]
pub struct MemoryBotStorage {
    state: Mutex<MemoryState>,
}

impl MemoryBotStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| HeraldError::persistence(e.to_string()))
    }
}

impl BotStorage for MemoryBotStorage {
    fn load_device_id(&self) -> Result<Option<DeviceId>> {
        Ok(self.state()?.device_id.clone())
    }

    fn store_device_id(&self, device_id: &DeviceId) -> Result<()> {
        self.state()?.device_id = Some(device_id.clone());
        Ok(())
    }

    fn load_next_batch(&self, user: &UserId) -> Result<Option<String>> {
        Ok(self.state()?.next_batch.get(user).cloned())
    }

    fn store_next_batch(&self, user: &UserId, token: &str) -> Result<()> {
        self.state()?.next_batch.insert(user.clone(), token.to_string());
        Ok(())
    }

    fn load_filter_id(&self, user: &UserId) -> Result<Option<String>> {
        Ok(self.state()?.filters.get(user).cloned())
    }

    fn store_filter_id(&self, user: &UserId, filter_id: &str) -> Result<()> {
        self.state()?.filters.insert(user.clone(), filter_id.to_string());
        Ok(())
    }

    fn save_room(&self, room: &RoomSnapshot) -> Result<()> {
        self.state()?.rooms.insert(room.room.clone(), room.clone());
        Ok(())
    }

    fn load_room(&self, room: &RoomId) -> Result<Option<RoomSnapshot>> {
        Ok(self.state()?.rooms.get(room).cloned())
    }
}
