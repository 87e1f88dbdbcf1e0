//! Task store: where reminders live between restarts.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use herald_core::error::{HeraldError, Result};
use herald_core::types::UserId;

use crate::tasks::Reminder;

/// Persistence for reminders. Implementations own their transaction discipline.
pub trait TaskStore: Send + Sync {
    /// Store a new reminder and return its assigned id. `reminder.id` is ignored.
    fn insert(&self, reminder: &Reminder) -> Result<i64>;

    /// Rewrite an existing reminder, matched by id.
    fn update(&self, reminder: &Reminder) -> Result<()>;

    /// Delete by id, returning the number of rows removed.
    fn delete(&self, id: i64) -> Result<usize>;

    fn get(&self, id: i64) -> Result<Option<Reminder>>;

    /// Reminders owned by exactly `user`, in id order.
    fn list(&self, user: &UserId) -> Result<Vec<Reminder>>;

    fn list_all(&self) -> Result<Vec<Reminder>>;
}

/// In-process task store.
#[derive(Default)]
pub struct MemoryTaskStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    tasks: BTreeMap<i64, Reminder>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|e| HeraldError::persistence(e.to_string()))
    }
}

impl TaskStore for MemoryTaskStore {
    fn insert(&self, reminder: &Reminder) -> Result<i64> {
        let mut inner = self.inner()?;
        inner.next_id += 1;
        let id = inner.next_id;
        let mut stored = reminder.clone();
        stored.id = id;
        inner.tasks.insert(id, stored);
        Ok(id)
    }

    fn update(&self, reminder: &Reminder) -> Result<()> {
        let mut inner = self.inner()?;
        match inner.tasks.get_mut(&reminder.id) {
            Some(existing) => {
                *existing = reminder.clone();
                Ok(())
            }
            None => Err(HeraldError::not_found(format!("reminder {}", reminder.id))),
        }
    }

    fn delete(&self, id: i64) -> Result<usize> {
        Ok(usize::from(self.inner()?.tasks.remove(&id).is_some()))
    }

    fn get(&self, id: i64) -> Result<Option<Reminder>> {
        Ok(self.inner()?.tasks.get(&id).cloned())
    }

    fn list(&self, user: &UserId) -> Result<Vec<Reminder>> {
        Ok(self
            .inner()?
            .tasks
            .values()
            .filter(|r| &r.user == user)
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<Reminder>> {
        Ok(self.inner()?.tasks.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::types::RoomId;

    fn reminder(user: &str) -> Reminder {
        Reminder::new(
            false,
            "friday",
            "09",
            "00",
            "deploy",
            RoomId::from("!r:x"),
            UserId::from(user),
        )
    }

    #[test]
    fn test_crud() {
        let store = MemoryTaskStore::new();
        let id = store.insert(&reminder("@a:x")).unwrap();
        let mut stored = store.get(id).unwrap().unwrap();
        assert_eq!(stored.id, id);

        stored.entry_id = Some(3);
        store.update(&stored).unwrap();
        assert_eq!(store.get(id).unwrap().unwrap().entry_id, Some(3));

        assert_eq!(store.delete(id).unwrap(), 1);
        assert_eq!(store.delete(id).unwrap(), 0);
        assert!(store.get(id).unwrap().is_none());
    }

    #[test]
    fn test_list_by_exact_user() {
        let store = MemoryTaskStore::new();
        store.insert(&reminder("@a:x")).unwrap();
        store.insert(&reminder("@a:x")).unwrap();
        store.insert(&reminder("@ab:x")).unwrap();
        assert_eq!(store.list(&UserId::from("@a:x")).unwrap().len(), 2);
        assert_eq!(store.list_all().unwrap().len(), 3);
    }
}
