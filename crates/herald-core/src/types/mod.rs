pub mod action;
pub mod event;
pub mod ids;

pub use action::{OutboundAction, Presence};
pub use event::{Event, EventKind, EventSource, Membership, SyncItem};
pub use ids::{DeviceId, EventId, RoomId, UserId};
