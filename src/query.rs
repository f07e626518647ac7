//! Read-only query surface over the committed pipeline snapshots.

use std::sync::Arc;

use crate::model::{EnrichedBooking, MovieInsight};
use crate::stages::{AggregationStage, EnrichedSnapshot, EnrichmentStage, InsightSnapshot};

/// Read-only access to the latest committed enrichment and aggregation
/// output.
///
/// Every call observes one atomic snapshot; concurrent stage runs never
/// tear a read.
#[derive(Clone)]
pub struct QueryService {
    enrichment: Arc<EnrichmentStage>,
    aggregation: Arc<AggregationStage>,
}

impl QueryService {
    pub fn new(enrichment: Arc<EnrichmentStage>, aggregation: Arc<AggregationStage>) -> Self {
        Self {
            enrichment,
            aggregation,
        }
    }

    /// Current enriched state of one booking.
    pub async fn booking(&self, booking_id: &str) -> Option<EnrichedBooking> {
        self.enrichment
            .snapshot()
            .await
            .rows
            .get(booking_id)
            .cloned()
    }

    /// Current enriched bookings for one movie.
    pub async fn bookings_for_movie(&self, movie_id: &str) -> Vec<EnrichedBooking> {
        self.enrichment
            .snapshot()
            .await
            .rows
            .values()
            .filter(|row| row.movie_id == movie_id)
            .cloned()
            .collect()
    }

    /// Latest insight for one movie.
    pub async fn movie_insight(&self, movie_id: &str) -> Option<MovieInsight> {
        self.aggregation
            .snapshot()
            .await
            .rows
            .get(movie_id)
            .cloned()
    }

    /// Full enriched snapshot.
    pub async fn enriched_snapshot(&self) -> EnrichedSnapshot {
        self.enrichment.snapshot().await
    }

    /// Full insight snapshot.
    pub async fn insight_snapshot(&self) -> InsightSnapshot {
        self.aggregation.snapshot().await
    }
}
