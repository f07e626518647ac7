//! Aggregation stage: per-movie insights over the enriched view.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::interfaces::stage::{Result, Stage, StageReport};
use crate::interfaces::EventStore;
use crate::model::{ActionTally, ChangeAction, EnrichedBooking, MovieInsight};
use crate::stages::EnrichmentStage;

/// Committed output of the aggregation stage.
#[derive(Debug, Clone, Default)]
pub struct InsightSnapshot {
    pub version: u64,
    pub rows: Arc<HashMap<String, MovieInsight>>,
}

#[derive(Default)]
struct AggState {
    /// Enrichment snapshot version reflected by the current output.
    seen_version: u64,
    /// Highest store sequence already tallied into the action counters.
    counter_cursor: u64,
    /// Cumulative insert/update counters per movie, from CDC metadata.
    tallies: HashMap<String, ActionTally>,
    /// Last known movie per booking, to re-aggregate a booking's previous
    /// movie when it is reassigned.
    booking_movies: HashMap<String, String>,
    snapshot: InsightSnapshot,
}

/// Incrementally recomputes [`MovieInsight`] rows.
///
/// Triggered by the enrichment snapshot version advancing, never by the
/// clock alone. Only movies touched by the changed booking keys (or by
/// newly tallied change actions) are recomputed; the rest carry over.
pub struct AggregationStage {
    store: Arc<dyn EventStore>,
    upstream: Arc<EnrichmentStage>,
    state: RwLock<AggState>,
}

impl AggregationStage {
    pub fn new(store: Arc<dyn EventStore>, upstream: Arc<EnrichmentStage>) -> Self {
        Self {
            store,
            upstream,
            state: RwLock::new(AggState::default()),
        }
    }

    /// Latest committed snapshot.
    pub async fn snapshot(&self) -> InsightSnapshot {
        self.state.read().await.snapshot.clone()
    }
}

#[async_trait]
impl Stage for AggregationStage {
    fn name(&self) -> &str {
        "aggregation"
    }

    async fn poll_ready(&self) -> Result<bool> {
        let seen = self.state.read().await.seen_version;
        Ok(self.upstream.snapshot().await.version != seen)
    }

    async fn run(&self) -> Result<StageReport> {
        let enriched = self.upstream.snapshot().await;

        let (counter_cursor, mut tallies, mut booking_movies, prev) = {
            let state = self.state.read().await;
            if enriched.version == state.seen_version {
                return Ok(StageReport::default());
            }
            (
                state.counter_cursor,
                state.tallies.clone(),
                state.booking_movies.clone(),
                state.snapshot.clone(),
            )
        };

        // Tally insert/update actions from change metadata, capped at the
        // snapshot's high-water mark so counters never lead the visible
        // enriched state.
        let mut affected: HashSet<String> = HashSet::new();
        let mut new_cursor = counter_cursor;
        let events = self.store.scan_since(counter_cursor).await?;
        for event in events
            .iter()
            .filter(|e| e.sequence <= enriched.through_sequence)
        {
            new_cursor = new_cursor.max(event.sequence);
            let tally = tallies.entry(event.booking.movie_id.clone()).or_default();
            match event.action {
                ChangeAction::Insert => tally.new_bookings += 1,
                ChangeAction::Update => tally.changed_bookings += 1,
                ChangeAction::Delete => {}
            }
            affected.insert(event.booking.movie_id.clone());
        }

        // Movies owning changed bookings, including the previous movie of
        // a reassigned booking.
        for id in enriched.changed.iter() {
            if let Some(row) = enriched.rows.get(id) {
                affected.insert(row.movie_id.clone());
                if let Some(previous) = booking_movies.insert(id.clone(), row.movie_id.clone()) {
                    if previous != row.movie_id {
                        affected.insert(previous);
                    }
                }
            }
        }

        if affected.is_empty() {
            let mut state = self.state.write().await;
            state.seen_version = enriched.version;
            state.counter_cursor = new_cursor;
            return Ok(StageReport::default());
        }

        let mut rows_by_movie: HashMap<&str, Vec<&EnrichedBooking>> = HashMap::new();
        for row in enriched.rows.values() {
            if affected.contains(row.movie_id.as_str()) {
                rows_by_movie
                    .entry(row.movie_id.as_str())
                    .or_default()
                    .push(row);
            }
        }

        let now = Utc::now();
        let mut insights = (*prev.rows).clone();
        for movie in &affected {
            let rows = rows_by_movie.remove(movie.as_str()).unwrap_or_default();
            let tally = tallies.get(movie).copied().unwrap_or_default();
            insights.insert(
                movie.clone(),
                MovieInsight::compute(movie, rows, tally, now),
            );
        }

        let recomputed = affected.len();
        let mut state = self.state.write().await;
        state.seen_version = enriched.version;
        state.counter_cursor = new_cursor;
        state.tallies = tallies;
        state.booking_movies = booking_movies;
        state.snapshot = InsightSnapshot {
            version: state.snapshot.version + 1,
            rows: Arc::new(insights),
        };
        let version = state.snapshot.version;
        drop(state);

        debug!(recomputed, version, "Aggregation refreshed");

        Ok(StageReport {
            rows_processed: recomputed,
        })
    }
}
