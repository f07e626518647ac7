//! Change capture log interface.

use async_trait::async_trait;

use crate::model::{ChangeEvent, Mutation};

/// Result type for capture log operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Errors that can occur while capturing or draining changes.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Invalid timestamp in stored change: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid change action in stored change: {0}")]
    InvalidAction(String),
}

/// Durable, ordered log of row-level mutations.
///
/// Sequence numbers are strictly monotonic across the log; per-booking
/// ordering follows from the single append path. Delivery to consumers is
/// at-least-once: the event store deduplicates by (booking_id, sequence)
/// to recover exactly-once materialization.
#[async_trait]
pub trait ChangeLog: Send + Sync {
    /// Append a change record for a source mutation.
    ///
    /// Stamps capture time when the mutation carries no timestamp, and
    /// returns the captured event with its assigned sequence.
    async fn capture(&self, mutation: Mutation) -> Result<ChangeEvent>;

    /// All events after `cursor` in capture order, plus the new cursor.
    ///
    /// Idempotent: draining twice from the same cursor yields the same
    /// events. An empty drain returns the cursor unchanged.
    async fn drain(&self, cursor: u64) -> Result<(Vec<ChangeEvent>, u64)>;

    /// Sequence of the most recent capture, 0 when the log is empty.
    async fn head(&self) -> Result<u64>;
}
