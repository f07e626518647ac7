//! SQLite EventStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, SqlitePool};

use crate::interfaces::event_store::{EventStore, Result, StorageError};
use crate::model::{Booking, ChangeEvent};
use crate::storage::helpers;
use crate::storage::schema::{Events, CREATE_EVENTS_TABLE};

/// SQLite implementation of the CDC event store.
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Create a new SQLite event store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the events table if it does not exist.
    pub async fn init(&self) -> Result<()> {
        self.pool
            .execute(sqlx::raw_sql(CREATE_EVENTS_TABLE))
            .await?;
        Ok(())
    }

    fn decode_row(row: &SqliteRow) -> Result<ChangeEvent> {
        let sequence: i64 = row.get("sequence");
        let action: String = row.get("action");
        let is_update: i64 = row.get("is_update");
        let changed_at: String = row.get("changed_at");
        let payload: Vec<u8> = row.get("payload");

        let booking: Booking = serde_json::from_slice(&payload)?;
        Ok(ChangeEvent {
            sequence: sequence as u64,
            action: action.parse().map_err(StorageError::InvalidAction)?,
            is_update: is_update != 0,
            changed_at: helpers::parse_timestamp(&changed_at)
                .map_err(StorageError::InvalidTimestamp)?,
            booking,
        })
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(&self, events: Vec<ChangeEvent>) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        // BEGIN IMMEDIATE acquires the write lock upfront, preventing
        // deadlocks when concurrent DEFERRED transactions race to upgrade
        // from shared to exclusive.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let mut appended = 0usize;
        for event in &events {
            let payload = match serde_json::to_vec(&event.booking) {
                Ok(payload) => payload,
                Err(e) => {
                    let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                    return Err(e.into());
                }
            };

            let query = Query::insert()
                .into_table(Events::Table)
                .columns([
                    Events::BookingId,
                    Events::Sequence,
                    Events::MovieId,
                    Events::Action,
                    Events::IsUpdate,
                    Events::ChangedAt,
                    Events::Payload,
                ])
                .values_panic([
                    event.booking.booking_id.clone().into(),
                    (event.sequence as i64).into(),
                    event.booking.movie_id.clone().into(),
                    event.action.as_str().into(),
                    (event.is_update as i64).into(),
                    helpers::format_timestamp(event.changed_at).into(),
                    payload.into(),
                ])
                .on_conflict(
                    OnConflict::columns([Events::BookingId, Events::Sequence])
                        .do_nothing()
                        .to_owned(),
                )
                .to_string(SqliteQueryBuilder);

            match sqlx::query(&query).execute(&mut *conn).await {
                Ok(result) => appended += result.rows_affected() as usize,
                Err(e) => {
                    let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                    return Err(e.into());
                }
            }
        }

        sqlx::query("COMMIT").execute(&mut *conn).await?;
        Ok(appended)
    }

    async fn scan_since(&self, sequence: u64) -> Result<Vec<ChangeEvent>> {
        let query = Query::select()
            .columns([
                Events::Sequence,
                Events::Action,
                Events::IsUpdate,
                Events::ChangedAt,
                Events::Payload,
            ])
            .from(Events::Table)
            .and_where(Expr::col(Events::Sequence).gt(sequence as i64))
            .order_by(Events::ChangedAt, Order::Asc)
            .order_by(Events::Sequence, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            events.push(Self::decode_row(row)?);
        }

        Ok(events)
    }

    async fn head(&self) -> Result<u64> {
        let query = Query::select()
            .expr(Expr::col(Events::Sequence).max())
            .from(Events::Table)
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => {
                let max_seq: Option<i64> = row.get(0);
                Ok(max_seq.map(|s| s as u64).unwrap_or(0))
            }
            None => Ok(0),
        }
    }
}
