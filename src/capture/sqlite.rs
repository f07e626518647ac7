//! SQLite change capture log.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, SqlitePool};

use crate::interfaces::change_log::{CaptureError, ChangeLog, Result};
use crate::model::{Booking, ChangeAction, ChangeEvent, Mutation};
use crate::storage::helpers;
use crate::storage::schema::{Changes, CREATE_CHANGES_TABLE};

/// Durable capture log backed by SQLite.
///
/// The AUTOINCREMENT rowid is the capture sequence, so sequences are
/// strictly monotonic and never reused even across deletions or
/// restarts.
pub struct SqliteChangeLog {
    pool: SqlitePool,
}

impl SqliteChangeLog {
    /// Create a new SQLite capture log.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the changes table if it does not exist.
    pub async fn init(&self) -> Result<()> {
        self.pool
            .execute(sqlx::raw_sql(CREATE_CHANGES_TABLE))
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
            action: action.parse().map_err(CaptureError::InvalidAction)?,
            is_update: is_update != 0,
            changed_at: helpers::parse_timestamp(&changed_at)
                .map_err(CaptureError::InvalidTimestamp)?,
            booking,
        })
    }
}

#[async_trait]
impl ChangeLog for SqliteChangeLog {
    async fn capture(&self, mutation: Mutation) -> Result<ChangeEvent> {
        let changed_at = mutation.changed_at.unwrap_or_else(Utc::now);
        let is_update = mutation.action == ChangeAction::Update;
        let payload = serde_json::to_vec(&mutation.booking)?;

        let query = Query::insert()
            .into_table(Changes::Table)
            .columns([
                Changes::BookingId,
                Changes::Action,
                Changes::IsUpdate,
                Changes::ChangedAt,
                Changes::Payload,
            ])
            .values_panic([
                mutation.booking.booking_id.clone().into(),
                mutation.action.as_str().into(),
                (is_update as i64).into(),
                helpers::format_timestamp(changed_at).into(),
                payload.into(),
            ])
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;

        Ok(ChangeEvent {
            sequence: result.last_insert_rowid() as u64,
            action: mutation.action,
            is_update,
            changed_at,
            booking: mutation.booking,
        })
    }

    async fn drain(&self, cursor: u64) -> Result<(Vec<ChangeEvent>, u64)> {
        let query = Query::select()
            .columns([
                Changes::Sequence,
                Changes::Action,
                Changes::IsUpdate,
                Changes::ChangedAt,
                Changes::Payload,
            ])
            .from(Changes::Table)
            .and_where(Expr::col(Changes::Sequence).gt(cursor as i64))
            .order_by(Changes::Sequence, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            events.push(Self::decode_row(row)?);
        }

        let new_cursor = events.last().map(|e| e.sequence).unwrap_or(cursor);
        Ok((events, new_cursor))
    }

    async fn head(&self) -> Result<u64> {
        let query = Query::select()
            .expr(Expr::col(Changes::Sequence).max())
            .from(Changes::Table)
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
