//! Outbound actions: deferred protocol calls executed by the outbound worker.

use serde::{Deserialize, Serialize};

use super::ids::{EventId, RoomId};

/// Presence states the bot can announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
    Unavailable,
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Presence::Online => write!(f, "online"),
            Presence::Offline => write!(f, "offline"),
            Presence::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// A deferred request to the messaging protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum OutboundAction {
    SendText { room: RoomId, body: String },
    SendHtml { room: RoomId, html: String },
    SendNotice { room: RoomId, body: String },
    SendReaction { room: RoomId, event: EventId, key: String },
    JoinRoom { room: RoomId },
    SetPresence { presence: Presence },
    /// Read receipt for a dispatched event.
    MarkRead { room: RoomId, event: EventId },
}

impl OutboundAction {
    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundAction::SendText { .. } => "send_text",
            OutboundAction::SendHtml { .. } => "send_html",
            OutboundAction::SendNotice { .. } => "send_notice",
            OutboundAction::SendReaction { .. } => "send_reaction",
            OutboundAction::JoinRoom { .. } => "join_room",
            OutboundAction::SetPresence { .. } => "set_presence",
            OutboundAction::MarkRead { .. } => "mark_read",
        }
    }

    /// Target room, if the action has one.
    pub fn room(&self) -> Option<&RoomId> {
        match self {
            OutboundAction::SendText { room, .. }
            | OutboundAction::SendHtml { room, .. }
            | OutboundAction::SendNotice { room, .. }
            | OutboundAction::SendReaction { room, .. }
            | OutboundAction::JoinRoom { room }
            | OutboundAction::MarkRead { room, .. } => Some(room),
            OutboundAction::SetPresence { .. } => None,
        }
    }
}
