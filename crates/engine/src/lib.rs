pub mod accounts;
pub mod catalog;
pub mod error;
pub mod fixtures;
pub mod format;
pub mod leaderboard;
pub mod ledger;
pub mod metrics;
pub mod platform;
pub mod predictions;
pub mod scoring;
pub mod session;

pub use error::{PoolError, Result};
pub use platform::Platform;
pub use session::{AnySessionStore, MemorySessionStore, Session, SessionStore, SqliteSessionStore};
