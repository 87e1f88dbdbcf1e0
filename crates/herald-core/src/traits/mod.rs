pub mod storage;
pub mod transport;

pub use storage::{BotStorage, RoomSnapshot};
pub use transport::{Credentials, Session, SyncStream, Transport};
