//! Enrichment stage: maintains the current enriched view per booking.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::interfaces::stage::{Result, Stage, StageReport};
use crate::interfaces::EventStore;
use crate::model::{ChangeEvent, EnrichedBooking};

/// Committed output of the enrichment stage.
///
/// `rows` is shared immutably; a new snapshot replaces the whole value,
/// so readers holding a clone keep a consistent view. `changed` lists the
/// booking ids recomputed in this version, and `through_sequence` is the
/// highest store sequence the snapshot reflects.
#[derive(Debug, Clone, Default)]
pub struct EnrichedSnapshot {
    pub version: u64,
    pub through_sequence: u64,
    pub rows: Arc<HashMap<String, EnrichedBooking>>,
    pub changed: Arc<HashSet<String>>,
}

#[derive(Default)]
struct EnrichState {
    /// Highest store sequence scanned so far.
    cursor: u64,
    snapshot: EnrichedSnapshot,
}

/// Incrementally derives [`EnrichedBooking`] rows from the event store.
///
/// Only bookings whose latest event advanced since the last run are
/// recomputed; every other row is carried over untouched. The row's
/// (changed_at, sequence) version is the memoization key.
pub struct EnrichmentStage {
    store: Arc<dyn EventStore>,
    state: RwLock<EnrichState>,
}

impl EnrichmentStage {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            state: RwLock::new(EnrichState::default()),
        }
    }

    /// Latest committed snapshot.
    pub async fn snapshot(&self) -> EnrichedSnapshot {
        self.state.read().await.snapshot.clone()
    }
}

#[async_trait]
impl Stage for EnrichmentStage {
    fn name(&self) -> &str {
        "enrichment"
    }

    async fn poll_ready(&self) -> Result<bool> {
        let cursor = self.state.read().await.cursor;
        Ok(self.store.head().await? > cursor)
    }

    async fn run(&self) -> Result<StageReport> {
        // Read state under the lock, then release it for the scan.
        let (cursor, prev) = {
            let state = self.state.read().await;
            (state.cursor, state.snapshot.clone())
        };

        let events = self.store.scan_since(cursor).await?;
        if events.is_empty() {
            return Ok(StageReport::default());
        }

        // scan_since orders by (changed_at, sequence), so the last insert
        // per booking wins.
        let mut latest: HashMap<&str, &ChangeEvent> = HashMap::new();
        for event in &events {
            latest.insert(event.booking.booking_id.as_str(), event);
        }

        let now = Utc::now();
        let mut rows = (*prev.rows).clone();
        let mut changed = HashSet::new();
        for (id, event) in latest {
            if let Some(existing) = rows.get(id) {
                if existing.version() >= event.version() {
                    continue;
                }
            }
            rows.insert(id.to_string(), EnrichedBooking::derive(event, now));
            changed.insert(id.to_string());
        }

        let through = events.iter().map(|e| e.sequence).max().unwrap_or(cursor);
        let recomputed = changed.len();

        let mut state = self.state.write().await;
        state.cursor = state.cursor.max(through);
        if !changed.is_empty() {
            state.snapshot = EnrichedSnapshot {
                version: state.snapshot.version + 1,
                through_sequence: state.cursor,
                rows: Arc::new(rows),
                changed: Arc::new(changed),
            };
        }
        let version = state.snapshot.version;
        drop(state);

        debug!(
            scanned = events.len(),
            recomputed, version, "Enrichment refreshed"
        );

        Ok(StageReport {
            rows_processed: recomputed,
        })
    }
}
