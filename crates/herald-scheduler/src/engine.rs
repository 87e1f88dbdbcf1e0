//! Scheduler engine: arms persisted reminders and fires them on time.
//! Uses tokio::interval for ticking; between ticks it only sleeps.
//!
//! ```text
//! Created ──add──► Armed ──tick──► Fired ─┬─ recurring ─► Armed (next week/day)
//!                    │                    └─ one-shot ──► Removed
//!                    └──remove──► Removed
//! ```
//!
//! Arming is in-memory only. Every start re-arms from the task store and
//! hands out fresh entry ids.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use herald_bot::OutboundClient;
use herald_core::config::SchedulerConfig;
use herald_core::error::{HeraldError, Result};
use herald_core::shutdown::Shutdown;
use herald_core::types::UserId;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cron::ScheduleSpec;
use crate::store::TaskStore;
use crate::tasks::Reminder;

/// A reminder currently waiting for its next run.
struct Armed {
    entry_id: u64,
    spec: ScheduleSpec,
    reminder: Reminder,
    next: DateTime<Utc>,
}

/// Owns the armed set and the task store.
pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    client: OutboundClient,
    tz: Tz,
    tick: Duration,
    armed: Mutex<HashMap<i64, Armed>>,
    next_entry: AtomicU64,
}

impl Scheduler {
    pub fn new(store: Arc<dyn TaskStore>, client: OutboundClient, config: &SchedulerConfig) -> Result<Self> {
        Ok(Self {
            store,
            client,
            tz: config.tz()?,
            tick: config.tick(),
            armed: Mutex::new(HashMap::new()),
            next_entry: AtomicU64::new(0),
        })
    }

    /// Current wall-clock time in the reference zone.
    pub fn now_local(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    fn armed(&self) -> MutexGuard<'_, HashMap<i64, Armed>> {
        self.armed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist a new reminder, arm it and record the entry id.
    pub fn add(&self, mut reminder: Reminder) -> Result<Reminder> {
        reminder.id = self.store.insert(&reminder)?;
        let entry_id = match self.arm(&reminder) {
            Ok(entry_id) => entry_id,
            Err(e) => {
                self.store.delete(reminder.id)?;
                return Err(e);
            }
        };
        reminder.entry_id = Some(entry_id);
        if let Err(e) = self.store.update(&reminder) {
            self.disarm(reminder.id);
            return Err(e);
        }
        tracing::info!(id = reminder.id, entry = entry_id, user = %reminder.user, "📅 Reminder added: {reminder}");
        Ok(reminder)
    }

    /// Compute the schedule and put the reminder in the armed set.
    fn arm(&self, reminder: &Reminder) -> Result<u64> {
        let spec = ScheduleSpec::from_reminder(reminder)?;
        let next = spec
            .next_after(&self.now_local())
            .ok_or_else(|| HeraldError::parse(format!("'{spec}' never fires")))?
            .with_timezone(&Utc);
        let entry_id = self.next_entry.fetch_add(1, Ordering::SeqCst) + 1;

        let mut reminder = reminder.clone();
        reminder.entry_id = Some(entry_id);
        tracing::debug!(id = reminder.id, entry = entry_id, %spec, %next, "armed");
        self.armed().insert(
            reminder.id,
            Armed {
                entry_id,
                spec,
                reminder,
                next,
            },
        );
        Ok(entry_id)
    }

    fn disarm(&self, id: i64) -> bool {
        self.armed().remove(&id).is_some()
    }

    /// Deliver the notification. One-shot reminders are removed afterwards.
    pub async fn fire(&self, reminder: &Reminder) -> Result<()> {
        tracing::info!(id = reminder.id, room = %reminder.room, "🔔 Reminder fired: {reminder}");
        self.client.send_text(&reminder.room, reminder.notification()).await;
        if !reminder.recurring {
            self.remove(reminder.id)?;
        }
        Ok(())
    }

    /// Delete, then disarm. `NotFound` when nothing was stored; a failed
    /// delete leaves the reminder armed.
    pub fn remove(&self, id: i64) -> Result<()> {
        let deleted = self.store.delete(id)?;
        self.disarm(id);
        if deleted == 0 {
            return Err(HeraldError::not_found(format!("no reminder with id {id}")));
        }
        tracing::info!(id, "🗑️ Reminder removed");
        Ok(())
    }

    /// Reminders owned by exactly `user`, in id order.
    pub fn list(&self, user: &UserId) -> Result<Vec<Reminder>> {
        let mut reminders = self.store.list(user)?;
        reminders.sort_by_key(|r| r.id);
        Ok(reminders)
    }

    pub fn is_armed(&self, id: i64) -> bool {
        self.armed().contains_key(&id)
    }

    pub fn armed_count(&self) -> usize {
        self.armed().len()
    }

    /// When the armed reminder runs next.
    pub fn next_fire(&self, id: i64) -> Option<DateTime<Utc>> {
        self.armed().get(&id).map(|a| a.next)
    }

    /// Fire everything due at `now`. Returns the ids that fired.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<i64> {
        let due: Vec<Reminder> = {
            let mut armed = self.armed();
            let local = now.with_timezone(&self.tz);
            let mut due = Vec::new();
            armed.retain(|_, entry| {
                if entry.next > now {
                    return true;
                }
                due.push(entry.reminder.clone());
                if !entry.reminder.recurring {
                    return false;
                }
                match entry.spec.next_after(&local) {
                    Some(next) => {
                        entry.next = next.with_timezone(&Utc);
                        true
                    }
                    None => {
                        tracing::warn!(id = entry.reminder.id, entry = entry.entry_id, "⚠️ No further run, disarming");
                        false
                    }
                }
            });
            due
        };

        let mut fired = Vec::with_capacity(due.len());
        for reminder in due {
            match self.fire(&reminder).await {
                Ok(()) => fired.push(reminder.id),
                Err(e) => tracing::warn!(id = reminder.id, "⚠️ Reminder failed: {e}"),
            }
        }
        fired
    }

    /// Re-arm every persisted reminder with a fresh entry id.
    /// Records that cannot be scheduled are logged and left alone.
    pub fn rearm(&self) -> Result<usize> {
        let mut count = 0;
        for mut reminder in self.store.list_all()? {
            match self.arm(&reminder) {
                Ok(entry_id) => {
                    reminder.entry_id = Some(entry_id);
                    self.store.update(&reminder)?;
                    count += 1;
                }
                Err(e) => tracing::warn!(id = reminder.id, "⚠️ Could not re-arm reminder: {e}"),
            }
        }
        Ok(count)
    }

    /// Re-arm from the store, then tick until shutdown.
    /// Shutdown only clears the armed set; stored reminders stay.
    pub fn start(self: &Arc<Self>, mut shutdown: Shutdown) -> Result<JoinHandle<()>> {
        let count = self.rearm()?;
        tracing::info!(
            "⏰ Scheduler started: {count} reminders armed, tick every {}s, zone {}",
            self.tick.as_secs(),
            self.tz
        );

        let scheduler = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => break,
                    _ = interval.tick() => {
                        scheduler.tick(Utc::now()).await;
                    }
                }
            }
            let disarmed = {
                let mut armed = scheduler.armed();
                let n = armed.len();
                armed.clear();
                n
            };
            tracing::info!("🛑 Scheduler stopped, {disarmed} reminders disarmed");
        }))
    }
}
