//! CDC event store and consumer cursor interfaces.

use async_trait::async_trait;

use crate::model::ChangeEvent;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Invalid timestamp in stored event: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid change action in stored event: {0}")]
    InvalidAction(String),
}

/// Append-only store of captured change events.
///
/// Rows are never updated or deleted once written.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist drained events, skipping any already present.
    ///
    /// Deduplication is by (booking_id, sequence), making re-appends after
    /// an interrupted drain harmless. Returns the number of events newly
    /// persisted.
    async fn append(&self, events: Vec<ChangeEvent>) -> Result<usize>;

    /// Events with sequence greater than `sequence`, ordered by
    /// (changed_at, sequence).
    ///
    /// Restartable: callers own the cursor and may re-issue the scan from
    /// any position.
    async fn scan_since(&self, sequence: u64) -> Result<Vec<ChangeEvent>>;

    /// Highest persisted sequence, 0 when the store is empty.
    async fn head(&self) -> Result<u64>;
}

/// Persistent drain positions, one per named consumer.
///
/// Lets a restarted process resume draining where it left off instead of
/// reprocessing the full log.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Last committed cursor for a consumer.
    async fn get(&self, consumer: &str) -> Result<Option<u64>>;

    /// Commit a consumer's cursor.
    async fn put(&self, consumer: &str, cursor: u64) -> Result<()>;
}
