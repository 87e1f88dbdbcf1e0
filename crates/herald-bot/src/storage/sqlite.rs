//! SQLite bot state: device ids, sync cursors and filter ids.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use herald_core::error::{HeraldError, Result};
use herald_core::traits::{BotStorage, RoomSnapshot};
use herald_core::types::{DeviceId, RoomId, UserId};
use rusqlite::{Connection, OptionalExtension, params};

pub struct SqliteBotStorage {
    conn: Mutex<Connection>,
}

impl SqliteBotStorage {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| HeraldError::persistence(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| HeraldError::persistence(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS device_ids (
                device_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            -- One row per account: where sync left off and which filter it used
            CREATE TABLE IF NOT EXISTS bot_batch (
                user_id TEXT PRIMARY KEY,
                batch_token TEXT,
                filter_id TEXT
            );
            ",
        )
        .map_err(|e| HeraldError::persistence(format!("Migration: {e}")))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| HeraldError::persistence(e.to_string()))
    }
}

impl BotStorage for SqliteBotStorage {
    fn load_device_id(&self) -> Result<Option<DeviceId>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT device_id FROM device_ids ORDER BY created_at DESC, rowid DESC LIMIT 1",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map(|id| id.map(DeviceId::from))
        .map_err(|e| HeraldError::persistence(format!("Load device id: {e}")))
    }

    fn store_device_id(&self, device_id: &DeviceId) -> Result<()> {
        tracing::debug!(device_id = %device_id, "store_device_id");
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO device_ids (device_id, created_at) VALUES (?1, ?2)
             ON CONFLICT (device_id) DO UPDATE SET created_at = excluded.created_at",
            params![device_id.as_str(), Utc::now().to_rfc3339()],
        )
        .map_err(|e| HeraldError::persistence(format!("Store device id: {e}")))?;
        Ok(())
    }

    fn load_next_batch(&self, user: &UserId) -> Result<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT batch_token FROM bot_batch WHERE user_id = ?1",
            params![user.as_str()],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map(Option::flatten)
        .map_err(|e| HeraldError::persistence(format!("Load next batch: {e}")))
    }

    fn store_next_batch(&self, user: &UserId, token: &str) -> Result<()> {
        tracing::debug!(user = %user, token, "store_next_batch");
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO bot_batch (user_id, batch_token) VALUES (?1, ?2)
             ON CONFLICT (user_id) DO UPDATE SET batch_token = excluded.batch_token",
            params![user.as_str(), token],
        )
        .map_err(|e| HeraldError::persistence(format!("Store next batch: {e}")))?;
        Ok(())
    }

    fn load_filter_id(&self, user: &UserId) -> Result<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT filter_id FROM bot_batch WHERE user_id = ?1",
            params![user.as_str()],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map(Option::flatten)
        .map_err(|e| HeraldError::persistence(format!("Load filter id: {e}")))
    }

    fn store_filter_id(&self, user: &UserId, filter_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO bot_batch (user_id, filter_id) VALUES (?1, ?2)
             ON CONFLICT (user_id) DO UPDATE SET filter_id = excluded.filter_id",
            params![user.as_str(), filter_id],
        )
        .map_err(|e| HeraldError::persistence(format!("Store filter id: {e}")))?;
        Ok(())
    }

    fn save_room(&self, _room: &RoomSnapshot) -> Result<()> {
        Err(HeraldError::Unsupported("sqlite bot storage does not keep rooms".into()))
    }

    fn load_room(&self, _room: &RoomId) -> Result<Option<RoomSnapshot>> {
        Err(HeraldError::Unsupported("sqlite bot storage does not keep rooms".into()))
    }
}
