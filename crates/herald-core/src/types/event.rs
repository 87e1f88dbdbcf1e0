//! Inbound room events as seen by the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EventId, RoomId, UserId};

/// Where the transport picked the event up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Timeline,
    State,
    Ephemeral,
    Invite,
    AccountData,
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventSource::Timeline => write!(f, "timeline"),
            EventSource::State => write!(f, "state"),
            EventSource::Ephemeral => write!(f, "ephemeral"),
            EventSource::Invite => write!(f, "invite"),
            EventSource::AccountData => write!(f, "account_data"),
        }
    }
}

/// Membership transitions carried by membership state events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Invite,
    Join,
    Leave,
    Ban,
    Knock,
}

/// What kind of event this is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "detail")]
pub enum EventKind {
    Message,
    Membership(Membership),
    Typing,
    Presence,
    Receipt,
    Other(String),
}

impl EventKind {
    /// Typing, presence and receipt signals carry nothing to react to.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, EventKind::Typing | EventKind::Presence | EventKind::Receipt)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Message => write!(f, "m.room.message"),
            EventKind::Membership(_) => write!(f, "m.room.member"),
            EventKind::Typing => write!(f, "m.typing"),
            EventKind::Presence => write!(f, "m.presence"),
            EventKind::Receipt => write!(f, "m.receipt"),
            EventKind::Other(t) => write!(f, "{t}"),
        }
    }
}

/// A single inbound event. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub room: RoomId,
    pub sender: UserId,
    pub kind: EventKind,
    /// Message body; empty for non-message events.
    #[serde(default)]
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// A plain message event.
    pub fn message(
        id: impl Into<EventId>,
        room: impl Into<RoomId>,
        sender: impl Into<UserId>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            room: room.into(),
            sender: sender.into(),
            kind: EventKind::Message,
            body: body.into(),
            timestamp: Utc::now(),
        }
    }

    /// A membership state event.
    pub fn membership(
        id: impl Into<EventId>,
        room: impl Into<RoomId>,
        sender: impl Into<UserId>,
        membership: Membership,
    ) -> Self {
        Self {
            id: id.into(),
            room: room.into(),
            sender: sender.into(),
            kind: EventKind::Membership(membership),
            body: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_message(&self) -> bool {
        self.kind == EventKind::Message
    }
}

/// One item of the inbound sync stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncItem {
    /// An event to dispatch.
    Event(EventSource, Event),
    /// The transport advanced its sync position; persist it to resume later.
    Cursor(String),
}
