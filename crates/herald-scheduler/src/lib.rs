//! # Herald Scheduler
//!
//! Reminders that survive restarts: parsed from chat commands, persisted in
//! SQLite and fired into the outbound queue on a minute-granular schedule.
//!
//! ## Architecture
//! ```text
//! "remind me every monday at 8am to ..." ─► timespec ─► Reminder
//!                                                         │
//! Scheduler (tokio interval)                              ▼
//!   ├── armed: id → (ScheduleSpec, next run)   ◄── TaskStore (SQLite / memory)
//!   └── on tick → OutboundClient::send_text
//!                   ├── recurring: re-armed for the next match
//!                   └── one-shot: removed
//! ```

pub mod commands;
pub mod cron;
pub mod engine;
pub mod persistence;
pub mod store;
pub mod tasks;
pub mod timespec;

pub use cron::ScheduleSpec;
pub use engine::Scheduler;
pub use persistence::SqliteTaskStore;
pub use store::{MemoryTaskStore, TaskStore};
pub use tasks::Reminder;
pub use timespec::{CommandPatterns, TimeSpec};
