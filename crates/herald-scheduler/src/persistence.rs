//! SQLite-backed reminder persistence. Survives restarts.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use herald_core::error::{HeraldError, Result};
use herald_core::types::{RoomId, UserId};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::store::TaskStore;
use crate::tasks::Reminder;

const COLUMNS: &str = "id, created_at, recurring, minute, hour, day, message, room, user, entry_id";

pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Open or create the reminder database.
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
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                recurring INTEGER NOT NULL DEFAULT 0,
                minute TEXT NOT NULL,
                hour TEXT NOT NULL,
                day TEXT NOT NULL,             -- weekday name, 'day' or 'weekday'
                message TEXT NOT NULL,
                room TEXT NOT NULL,
                user TEXT NOT NULL,
                entry_id INTEGER               -- live schedule handle, stale after restart
            );
            CREATE INDEX IF NOT EXISTS idx_reminders_user ON reminders(user);
            ",
            )
            .map_err(|e| HeraldError::persistence(format!("Migration: {e}")))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| HeraldError::persistence(e.to_string()))
    }

    fn query(&self, sql: &str, user: Option<&UserId>) -> Result<Vec<Reminder>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| HeraldError::persistence(format!("Prepare: {e}")))?;
        let rows = match user {
            Some(user) => stmt.query_map(params![user.as_str()], row_to_reminder),
            None => stmt.query_map([], row_to_reminder),
        }
        .map_err(|e| HeraldError::persistence(format!("Query: {e}")))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| HeraldError::persistence(format!("Read row: {e}")))
    }
}

fn row_to_reminder(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    let created_at: String = row.get(1)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    Ok(Reminder {
        id: row.get(0)?,
        created_at,
        recurring: row.get::<_, i32>(2)? != 0,
        minute: row.get(3)?,
        hour: row.get(4)?,
        day: row.get(5)?,
        message: row.get(6)?,
        room: RoomId::from(row.get::<_, String>(7)?),
        user: UserId::from(row.get::<_, String>(8)?),
        entry_id: row.get::<_, Option<i64>>(9)?.map(|e| e as u64),
    })
}

impl TaskStore for SqliteTaskStore {
    fn insert(&self, reminder: &Reminder) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO reminders (created_at, recurring, minute, hour, day, message, room, user, entry_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                reminder.created_at.to_rfc3339(),
                reminder.recurring as i32,
                reminder.minute,
                reminder.hour,
                reminder.day,
                reminder.message,
                reminder.room.as_str(),
                reminder.user.as_str(),
                reminder.entry_id.map(|e| e as i64),
            ],
        )
        .map_err(|e| HeraldError::persistence(format!("Insert reminder: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, reminder: &Reminder) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE reminders SET recurring = ?2, minute = ?3, hour = ?4, day = ?5,
                 message = ?6, room = ?7, user = ?8, entry_id = ?9 WHERE id = ?1",
                params![
                    reminder.id,
                    reminder.recurring as i32,
                    reminder.minute,
                    reminder.hour,
                    reminder.day,
                    reminder.message,
                    reminder.room.as_str(),
                    reminder.user.as_str(),
                    reminder.entry_id.map(|e| e as i64),
                ],
            )
            .map_err(|e| HeraldError::persistence(format!("Update reminder: {e}")))?;
        if changed == 0 {
            return Err(HeraldError::not_found(format!("reminder {}", reminder.id)));
        }
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<usize> {
        self.conn()?
            .execute("DELETE FROM reminders WHERE id = ?1", params![id])
            .map_err(|e| HeraldError::persistence(format!("Delete reminder: {e}")))
    }

    fn get(&self, id: i64) -> Result<Option<Reminder>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM reminders WHERE id = ?1"),
            params![id],
            row_to_reminder,
        )
        .optional()
        .map_err(|e| HeraldError::persistence(format!("Get reminder: {e}")))
    }

    fn list(&self, user: &UserId) -> Result<Vec<Reminder>> {
        self.query(
            &format!("SELECT {COLUMNS} FROM reminders WHERE user = ?1 ORDER BY id"),
            Some(user),
        )
    }

    fn list_all(&self) -> Result<Vec<Reminder>> {
        self.query(&format!("SELECT {COLUMNS} FROM reminders ORDER BY id"), None)
    }
}
