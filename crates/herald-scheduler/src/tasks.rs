//! Reminder definitions: the data model for scheduled notifications.

use chrono::{DateTime, Utc};
use herald_core::types::{RoomId, UserId};
use serde::{Deserialize, Serialize};

/// A scheduled reminder.
///
/// `day` is stored resolved: a lowercase weekday name, `day` for every day or
/// `weekday` for Monday to Friday. Relative words like `tomorrow` never reach
/// persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Assigned by the task store on insert; 0 until then.
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub recurring: bool,
    /// Two-digit minute, e.g. `"05"`.
    pub minute: String,
    /// Two-digit 24-hour hour, e.g. `"15"`.
    pub hour: String,
    pub day: String,
    pub message: String,
    pub room: RoomId,
    pub user: UserId,
    /// Handle of the live schedule entry. `Some` only while armed in this process.
    #[serde(default)]
    pub entry_id: Option<u64>,
}

impl Reminder {
    pub fn new(
        recurring: bool,
        day: impl Into<String>,
        hour: impl Into<String>,
        minute: impl Into<String>,
        message: impl Into<String>,
        room: RoomId,
        user: UserId,
    ) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            recurring,
            minute: minute.into(),
            hour: hour.into(),
            day: day.into(),
            message: message.into(),
            room,
            user,
            entry_id: None,
        }
    }

    /// What the owner sees when the reminder fires.
    pub fn notification(&self) -> String {
        format!("🗓️ {}, reminding you {}", self.user.localpart(), self.message)
    }
}

impl std::fmt::Display for Reminder {
    /// `every monday at 08:00: submit report`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.recurring {
            write!(f, "every ")?;
        }
        write!(f, "{} at {}:{}: {}", self.day, self.hour, self.minute, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reminder(recurring: bool) -> Reminder {
        Reminder::new(
            recurring,
            "monday",
            "08",
            "00",
            "submit report",
            RoomId::from("!r:example.org"),
            UserId::from("@alice:example.org"),
        )
    }

    #[test]
    fn test_display() {
        assert_eq!(reminder(true).to_string(), "every monday at 08:00: submit report");
        assert_eq!(reminder(false).to_string(), "monday at 08:00: submit report");
    }

    #[test]
    fn test_notification() {
        assert_eq!(reminder(true).notification(), "🗓️ alice, reminding you submit report");
    }
}
