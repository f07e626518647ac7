//! In-memory change capture log.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::interfaces::change_log::{ChangeLog, Result};
use crate::model::{ChangeAction, ChangeEvent, Mutation};

#[derive(Default)]
struct LogInner {
    events: Vec<ChangeEvent>,
    last_sequence: u64,
}

/// In-memory capture log.
///
/// The write lock makes capture the single logical writer, which is what
/// preserves per-booking ordering. Drains and head checks run under the
/// read lock and observe a snapshot consistent at the time of read.
#[derive(Default)]
pub struct MemoryChangeLog {
    inner: RwLock<LogInner>,
}

impl MemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChangeLog for MemoryChangeLog {
    async fn capture(&self, mutation: Mutation) -> Result<ChangeEvent> {
        let mut inner = self.inner.write().await;
        inner.last_sequence += 1;
        let event = ChangeEvent {
            sequence: inner.last_sequence,
            action: mutation.action,
            is_update: mutation.action == ChangeAction::Update,
            changed_at: mutation.changed_at.unwrap_or_else(Utc::now),
            booking: mutation.booking,
        };
        inner.events.push(event.clone());
        Ok(event)
    }

    async fn drain(&self, cursor: u64) -> Result<(Vec<ChangeEvent>, u64)> {
        let inner = self.inner.read().await;
        let events: Vec<ChangeEvent> = inner
            .events
            .iter()
            .filter(|e| e.sequence > cursor)
            .cloned()
            .collect();
        let new_cursor = events.last().map(|e| e.sequence).unwrap_or(cursor);
        Ok((events, new_cursor))
    }

    async fn head(&self) -> Result<u64> {
        Ok(self.inner.read().await.last_sequence)
    }
}
