//! Pipeline runtime: wires the capture log and stages together.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::SchedulerConfig;
use crate::interfaces::change_log::Result as CaptureResult;
use crate::interfaces::stage::Result as StageResult;
use crate::interfaces::{ChangeLog, CursorStore, EventStore, Stage};
use crate::model::{ChangeEvent, Mutation};
use crate::query::QueryService;
use crate::scheduler::{StageHandle, StageScheduler};
use crate::stages::{AggregationStage, EnrichmentStage, IngestStage};

/// The assembled pipeline: capture log -> ingest -> enrichment ->
/// aggregation.
///
/// Stages share nothing but their upstream's committed snapshot, so each
/// can run concurrently with the next tick of its upstream.
pub struct Pipeline {
    log: Arc<dyn ChangeLog>,
    ingest: Arc<IngestStage>,
    enrichment: Arc<EnrichmentStage>,
    aggregation: Arc<AggregationStage>,
    scheduler: SchedulerConfig,
}

impl Pipeline {
    pub fn new(
        log: Arc<dyn ChangeLog>,
        store: Arc<dyn EventStore>,
        cursors: Arc<dyn CursorStore>,
        scheduler: SchedulerConfig,
    ) -> Self {
        let ingest = Arc::new(IngestStage::new(log.clone(), store.clone(), cursors));
        let enrichment = Arc::new(EnrichmentStage::new(store.clone()));
        let aggregation = Arc::new(AggregationStage::new(store, enrichment.clone()));

        Self {
            log,
            ingest,
            enrichment,
            aggregation,
            scheduler,
        }
    }

    /// Ingestion interface: capture one source mutation.
    pub async fn ingest(&self, mutation: Mutation) -> CaptureResult<ChangeEvent> {
        self.log.capture(mutation).await
    }

    /// Read-only query surface.
    pub fn query(&self) -> QueryService {
        QueryService::new(self.enrichment.clone(), self.aggregation.clone())
    }

    /// Drive every stage once, in pipeline order.
    ///
    /// Used by tests and one-shot runs; the scheduled runtime calls the
    /// stages independently.
    pub async fn tick(&self) -> StageResult<()> {
        self.ingest.run().await?;
        self.enrichment.run().await?;
        self.aggregation.run().await?;
        Ok(())
    }

    /// Spawn one scheduler task per stage.
    pub fn start(&self) -> PipelineRunner {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();
        let mut tasks = Vec::new();

        let stages: [(Arc<dyn Stage>, Duration); 3] = [
            (
                self.ingest.clone(),
                Duration::from_secs(self.scheduler.ingest_interval_secs),
            ),
            (
                self.enrichment.clone(),
                Duration::from_secs(self.scheduler.enrichment_interval_secs),
            ),
            (
                self.aggregation.clone(),
                Duration::from_secs(self.scheduler.aggregation_interval_secs),
            ),
        ];

        for (stage, interval) in stages {
            let scheduler = StageScheduler::new(stage, interval, shutdown_rx.clone());
            handles.push(scheduler.handle());
            tasks.push(tokio::spawn(scheduler.run()));
        }

        info!(stages = handles.len(), "Pipeline started");

        PipelineRunner {
            shutdown: shutdown_tx,
            tasks,
            handles,
        }
    }
}

/// Running pipeline: scheduler tasks plus their control handles.
pub struct PipelineRunner {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    handles: Vec<StageHandle>,
}

impl PipelineRunner {
    /// Control handles for the running stages, in pipeline order.
    pub fn stages(&self) -> &[StageHandle] {
        &self.handles
    }

    /// Signal shutdown and wait for every scheduler to stop.
    ///
    /// Schedulers only cancel between runs, so no partial output is left
    /// behind.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        futures::future::join_all(self.tasks).await;
        info!("Pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MemoryChangeLog;
    use crate::config::SchedulerConfig;
    use crate::model::{Booking, BookingStatus};
    use crate::storage::{MemoryCursorStore, MemoryEventStore};
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal_macros::dec;

    fn pipeline() -> Pipeline {
        Pipeline::new(
            Arc::new(MemoryChangeLog::new()),
            Arc::new(MemoryEventStore::new()),
            Arc::new(MemoryCursorStore::new()),
            SchedulerConfig::default(),
        )
    }

    fn booking(id: &str) -> Booking {
        let now = Utc::now();
        Booking {
            booking_id: id.into(),
            customer_id: "c-1".into(),
            movie_id: "m-1".into(),
            booking_date: now - ChronoDuration::days(1),
            status: BookingStatus::Booked,
            ticket_count: 1,
            ticket_price: dec!(100),
            total_amount: dec!(100),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_tick_flows_end_to_end() {
        let pipeline = pipeline();
        pipeline.ingest(Mutation::insert(booking("b-1"))).await.unwrap();
        pipeline.tick().await.unwrap();

        let query = pipeline.query();
        assert!(query.booking("b-1").await.is_some());
        assert_eq!(
            query.movie_insight("m-1").await.unwrap().total_bookings,
            1
        );
    }

    #[tokio::test]
    async fn test_scheduled_runtime_processes_and_stops() {
        let pipeline = Pipeline::new(
            Arc::new(MemoryChangeLog::new()),
            Arc::new(MemoryEventStore::new()),
            Arc::new(MemoryCursorStore::new()),
            SchedulerConfig {
                ingest_interval_secs: 1,
                enrichment_interval_secs: 1,
                aggregation_interval_secs: 1,
            },
        );
        pipeline.ingest(Mutation::insert(booking("b-1"))).await.unwrap();

        let runner = pipeline.start();
        assert_eq!(runner.stages().len(), 3);

        // First ticks fire immediately; force the downstream stages once
        // the data lands.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        for handle in runner.stages() {
            handle.run_now();
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let query = pipeline.query();
        assert!(query.booking("b-1").await.is_some());

        runner.shutdown().await;
    }
}
