//! SQLite CursorStore implementation.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{Executor, Row, SqlitePool};

use crate::interfaces::event_store::{CursorStore, Result};
use crate::storage::helpers;
use crate::storage::schema::{Cursors, CREATE_CURSORS_TABLE};

/// SQLite implementation of the consumer cursor store.
pub struct SqliteCursorStore {
    pool: SqlitePool,
}

impl SqliteCursorStore {
    /// Create a new SQLite cursor store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the cursors table if it does not exist.
    pub async fn init(&self) -> Result<()> {
        self.pool
            .execute(sqlx::raw_sql(CREATE_CURSORS_TABLE))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CursorStore for SqliteCursorStore {
    async fn get(&self, consumer: &str) -> Result<Option<u64>> {
        let query = Query::select()
            .column(Cursors::Position)
            .from(Cursors::Table)
            .and_where(Expr::col(Cursors::Consumer).eq(consumer))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => {
                let position: i64 = row.get("position");
                Ok(Some(position as u64))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, consumer: &str, cursor: u64) -> Result<()> {
        let query = Query::insert()
            .into_table(Cursors::Table)
            .columns([Cursors::Consumer, Cursors::Position, Cursors::UpdatedAt])
            .values_panic([
                consumer.into(),
                (cursor as i64).into(),
                helpers::format_timestamp(Utc::now()).into(),
            ])
            .on_conflict(
                OnConflict::column(Cursors::Consumer)
                    .update_columns([Cursors::Position, Cursors::UpdatedAt])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;

        Ok(())
    }
}
