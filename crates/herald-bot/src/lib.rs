//! # Herald Bot
//!
//! The event dispatch core: predicates decide which handlers see an event,
//! the [`Bot`] runs matching handlers under a deadline, and every side effect
//! leaves through the outbound queue so the transport only ever sees one
//! call at a time.

pub mod builtin;
pub mod dispatcher;
pub mod handler;
pub mod outbound;
pub mod predicates;
pub mod storage;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use dispatcher::{Bot, DispatchReport};
pub use handler::{EventHandler, Handler, HandlerContext, handler_fn};
pub use outbound::{OutboundClient, OutboundWorker, WorkerStats};
pub use predicates::Predicate;
pub use storage::MultiplexStorage;
