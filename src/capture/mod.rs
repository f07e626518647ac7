//! Change capture log implementations.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryChangeLog;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteChangeLog;
