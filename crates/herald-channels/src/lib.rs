//! # Herald Channels
//! Transport implementations.
//!
//! Only the console transport ships in-tree; it drives the bot from a
//! terminal without a homeserver.

pub mod console;

pub use console::ConsoleTransport;
