//! Domain model: bookings, captured changes, and derived read models.

mod enriched;
mod insight;

pub use enriched::{EnrichedBooking, PriceCategory, SizeCategory, StatusCategory};
pub use insight::{ActionTally, MovieInsight};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a booking at the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Booked,
    Cancelled,
}

/// Kind of row-level mutation captured from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Insert => "INSERT",
            ChangeAction::Update => "UPDATE",
            ChangeAction::Delete => "DELETE",
        }
    }
}

impl std::str::FromStr for ChangeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(ChangeAction::Insert),
            "UPDATE" => Ok(ChangeAction::Update),
            "DELETE" => Ok(ChangeAction::Delete),
            other => Err(format!("unknown change action: {other}")),
        }
    }
}

/// Source booking record.
///
/// Identifier fields default to empty when absent from the ingested
/// payload; validation flags such rows instead of rejecting them at the
/// ingestion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    #[serde(default)]
    pub booking_id: String,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub movie_id: String,
    pub booking_date: DateTime<Utc>,
    pub status: BookingStatus,
    pub ticket_count: i64,
    pub ticket_price: Decimal,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// The derived amount: ticket_count × ticket_price, exact.
    ///
    /// `total_amount` is carried on the record for validation but is never
    /// independently mutable state; this is its single derivation point.
    pub fn derived_total(&self) -> Decimal {
        Decimal::from(self.ticket_count) * self.ticket_price
    }
}

/// A mutation submitted to the ingestion interface.
///
/// Carries the post-mutation row state, or the pre-delete state for
/// deletes. `changed_at` is optional; the capture log stamps capture time
/// when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub action: ChangeAction,
    pub booking: Booking,
    #[serde(default)]
    pub changed_at: Option<DateTime<Utc>>,
}

impl Mutation {
    pub fn insert(booking: Booking) -> Self {
        Self {
            action: ChangeAction::Insert,
            booking,
            changed_at: None,
        }
    }

    pub fn update(booking: Booking) -> Self {
        Self {
            action: ChangeAction::Update,
            booking,
            changed_at: None,
        }
    }

    pub fn delete(booking: Booking) -> Self {
        Self {
            action: ChangeAction::Delete,
            booking,
            changed_at: None,
        }
    }

    /// Pin the capture timestamp instead of stamping at capture time.
    pub fn at(mut self, changed_at: DateTime<Utc>) -> Self {
        self.changed_at = Some(changed_at);
        self
    }
}

/// A captured change record. Immutable once written.
///
/// `sequence` is assigned by the capture log and is strictly monotonic
/// across the log, so (changed_at, sequence) gives a total order with a
/// deterministic tie-break, and (booking_id, sequence) identifies the
/// event for downstream deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub sequence: u64,
    pub action: ChangeAction,
    pub is_update: bool,
    pub changed_at: DateTime<Utc>,
    pub booking: Booking,
}

impl ChangeEvent {
    /// Ordering key for last-write-wins resolution.
    pub fn version(&self) -> (DateTime<Utc>, u64) {
        (self.changed_at, self.sequence)
    }
}
