//! # Herald Core
//!
//! Shared vocabulary for the Herald bot: the error type, configuration,
//! event and outbound-action types, the transport and storage traits, and the
//! process-wide shutdown signal.

pub mod config;
pub mod error;
pub mod shutdown;
pub mod traits;
pub mod types;

pub use config::HeraldConfig;
pub use error::{HeraldError, Result};
pub use shutdown::{Shutdown, ShutdownTrigger};
