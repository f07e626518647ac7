//! Pipeline stage interface.
//!
//! A stage consumes a consistent snapshot of its upstream output and
//! commits its own output atomically; a failed run leaves the previously
//! committed output untouched.

use async_trait::async_trait;

use super::{CaptureError, StorageError};

/// Result type for stage operations.
pub type Result<T> = std::result::Result<T, StageError>;

/// Errors from a stage run.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Recoverable failure. The scheduler retries on the next tick; no
    /// data is lost because stage inputs replay from their cursor.
    #[error("Transient stage failure: {0}")]
    Transient(String),

    /// Unrecoverable failure. The scheduler halts the stage; committed
    /// output stays visible.
    #[error("Fatal stage failure: {0}")]
    Fatal(String),
}

impl From<CaptureError> for StageError {
    fn from(err: CaptureError) -> Self {
        StageError::Transient(err.to_string())
    }
}

impl From<StorageError> for StageError {
    fn from(err: StorageError) -> Self {
        StageError::Transient(err.to_string())
    }
}

/// Outcome of a successful stage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Rows read, recomputed, or written by this run.
    pub rows_processed: usize,
}

/// A schedulable unit of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name of this stage, used in logs and status reporting.
    fn name(&self) -> &str;

    /// Whether upstream input changed since the last run.
    ///
    /// The scheduler skips `run` when this returns false, so redundant
    /// ticks cost one dirty check instead of a recomputation.
    async fn poll_ready(&self) -> Result<bool>;

    /// Execute one run over the pending input.
    async fn run(&self) -> Result<StageReport>;
}
