//! JSON file bot state. Human-readable, rewritten on every change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use herald_core::error::{HeraldError, Result};
use herald_core::traits::{BotStorage, RoomSnapshot};
use herald_core::types::{DeviceId, RoomId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    device_id: Option<DeviceId>,
    #[serde(default)]
    next_batch: HashMap<UserId, String>,
    #[serde(default)]
    filters: HashMap<UserId, String>,
}

pub struct FileBotStorage {
    path: PathBuf,
    state: Mutex<StateFile>,
}

impl FileBotStorage {
    /// Open the state file, starting empty when it does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let state = if path.exists() {
            let json = std::fs::read_to_string(path)?;
            serde_json::from_str(&json)
                .map_err(|e| HeraldError::persistence(format!("Failed to parse {}: {e}", path.display())))?
        } else {
            StateFile::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    fn state(&self) -> Result<MutexGuard<'_, StateFile>> {
        self.state
            .lock()
            .map_err(|e| HeraldError::persistence(e.to_string()))
    }

    fn update(&self, f: impl FnOnce(&mut StateFile)) -> Result<()> {
        let mut state = self.state()?;
        f(&mut state);
        let json = serde_json::to_string_pretty(&*state)?;
        std::fs::write(&self.path, json)
            .map_err(|e| HeraldError::persistence(format!("Write error: {e}")))?;
        tracing::debug!("💾 Saved bot state to {}", self.path.display());
        Ok(())
    }
}

impl BotStorage for FileBotStorage {
    fn load_device_id(&self) -> Result<Option<DeviceId>> {
        Ok(self.state()?.device_id.clone())
    }

    fn store_device_id(&self, device_id: &DeviceId) -> Result<()> {
        self.update(|s| s.device_id = Some(device_id.clone()))
    }

    fn load_next_batch(&self, user: &UserId) -> Result<Option<String>> {
        Ok(self.state()?.next_batch.get(user).cloned())
    }

    fn store_next_batch(&self, user: &UserId, token: &str) -> Result<()> {
        self.update(|s| {
            s.next_batch.insert(user.clone(), token.to_string());
        })
    }

    fn load_filter_id(&self, user: &UserId) -> Result<Option<String>> {
        Ok(self.state()?.filters.get(user).cloned())
    }

    fn store_filter_id(&self, user: &UserId, filter_id: &str) -> Result<()> {
        self.update(|s| {
            s.filters.insert(user.clone(), filter_id.to_string());
        })
    }

    fn save_room(&self, _room: &RoomSnapshot) -> Result<()> {
        Err(HeraldError::Unsupported("file bot storage does not keep rooms".into()))
    }

    fn load_room(&self, _room: &RoomId) -> Result<Option<RoomSnapshot>> {
        Err(HeraldError::Unsupported("file bot storage does not keep rooms".into()))
    }
}
