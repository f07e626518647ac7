//! Storage implementations.

use std::sync::Arc;

use tracing::info;

use crate::capture::MemoryChangeLog;
use crate::config::{StorageConfig, StorageType};
use crate::interfaces::{ChangeLog, CursorStore, EventStore};

pub mod helpers;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{MemoryCursorStore, MemoryEventStore};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteCursorStore, SqliteEventStore};

/// Initialize storage based on configuration.
///
/// Returns the capture log, event store, and cursor store for the
/// configured backend.
pub async fn init_storage(
    config: &StorageConfig,
) -> Result<
    (Arc<dyn ChangeLog>, Arc<dyn EventStore>, Arc<dyn CursorStore>),
    Box<dyn std::error::Error>,
> {
    match config.storage_type {
        StorageType::Memory => {
            info!("Storage: memory");
            Ok((
                Arc::new(MemoryChangeLog::new()),
                Arc::new(MemoryEventStore::new()),
                Arc::new(MemoryCursorStore::new()),
            ))
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            use std::time::Duration;

            use backon::Retryable;
            use tracing::warn;

            use crate::capture::SqliteChangeLog;
            use crate::utils::retry::connection_backoff;

            info!(path = %config.sqlite.path, "Storage: sqlite");

            if let Some(parent) = std::path::Path::new(&config.sqlite.path).parent() {
                std::fs::create_dir_all(parent)?;
            }

            let uri = format!("sqlite:{}?mode=rwc", config.sqlite.path);
            let pool = (|| sqlx::SqlitePool::connect(&uri))
                .retry(connection_backoff())
                .notify(|err: &sqlx::Error, dur: Duration| {
                    warn!(error = %err, delay = ?dur, "Storage connection failed, retrying");
                })
                .await?;

            let change_log = Arc::new(SqliteChangeLog::new(pool.clone()));
            change_log.init().await?;

            let event_store = Arc::new(SqliteEventStore::new(pool.clone()));
            event_store.init().await?;

            let cursor_store = Arc::new(SqliteCursorStore::new(pool));
            cursor_store.init().await?;

            Ok((change_log, event_store, cursor_store))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err("SQLite feature not enabled".into())
        }
    }
}
