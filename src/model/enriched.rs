//! Enriched booking view: business categorization over captured changes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Booking, BookingStatus, ChangeAction, ChangeEvent};

/// ACTIVE/INACTIVE categorization of the booking status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCategory {
    Active,
    Inactive,
}

/// Party-size categorization by ticket count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizeCategory {
    Single,
    Group,
    LargeGroup,
}

/// Price-band categorization by total amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceCategory {
    Budget,
    Standard,
    Premium,
}

/// BOOKED maps to ACTIVE, CANCELLED to INACTIVE.
pub fn status_category(status: BookingStatus) -> StatusCategory {
    match status {
        BookingStatus::Booked => StatusCategory::Active,
        BookingStatus::Cancelled => StatusCategory::Inactive,
    }
}

/// 1 ticket is SINGLE, 2-4 GROUP, 5 and up LARGE_GROUP.
pub fn size_category(ticket_count: i64) -> SizeCategory {
    match ticket_count {
        i64::MIN..=1 => SizeCategory::Single,
        2..=4 => SizeCategory::Group,
        _ => SizeCategory::LargeGroup,
    }
}

/// Below 250 is BUDGET, 250-500 inclusive STANDARD, above 500 PREMIUM.
pub fn price_category(total_amount: Decimal) -> PriceCategory {
    if total_amount < Decimal::from(250) {
        PriceCategory::Budget
    } else if total_amount <= Decimal::from(500) {
        PriceCategory::Standard
    } else {
        PriceCategory::Premium
    }
}

/// Row-level validation. Invalid rows are retained and flagged, never
/// dropped.
pub fn is_valid(booking: &Booking, now: DateTime<Utc>) -> bool {
    !booking.booking_id.trim().is_empty()
        && !booking.customer_id.trim().is_empty()
        && !booking.movie_id.trim().is_empty()
        && booking.ticket_count > 0
        && booking.ticket_price >= Decimal::ZERO
        && booking.booking_date <= now
        && booking.total_amount == booking.derived_total()
}

/// Current enriched state of a single booking.
///
/// Exactly one of these exists per booking_id in a committed enrichment
/// snapshot; the winning source event is the latest by
/// (changed_at, sequence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedBooking {
    pub booking_id: String,
    pub customer_id: String,
    pub movie_id: String,
    pub booking_date: DateTime<Utc>,
    pub status: BookingStatus,
    pub ticket_count: i64,
    pub ticket_price: Decimal,
    pub total_amount: Decimal,
    pub booking_status_category: StatusCategory,
    pub booking_size_category: SizeCategory,
    pub price_category: PriceCategory,
    pub active_revenue: Decimal,
    pub lost_revenue: Decimal,
    pub is_valid_booking: bool,
    /// Action of the winning event. DELETE marks the booking as removed
    /// from active totals while keeping it visible for deleted counts.
    pub latest_action: ChangeAction,
    pub changed_at: DateTime<Utc>,
    pub sequence: u64,
}

impl EnrichedBooking {
    /// Derive the enriched view from a captured event.
    ///
    /// Pure apart from the caller-supplied evaluation instant, which only
    /// feeds the future-date validity check.
    pub fn derive(event: &ChangeEvent, now: DateTime<Utc>) -> Self {
        let booking = &event.booking;
        let (active_revenue, lost_revenue) = match booking.status {
            BookingStatus::Booked => (booking.total_amount, Decimal::ZERO),
            BookingStatus::Cancelled => (Decimal::ZERO, booking.total_amount),
        };

        Self {
            booking_id: booking.booking_id.clone(),
            customer_id: booking.customer_id.clone(),
            movie_id: booking.movie_id.clone(),
            booking_date: booking.booking_date,
            status: booking.status,
            ticket_count: booking.ticket_count,
            ticket_price: booking.ticket_price,
            total_amount: booking.total_amount,
            booking_status_category: status_category(booking.status),
            booking_size_category: size_category(booking.ticket_count),
            price_category: price_category(booking.total_amount),
            active_revenue,
            lost_revenue,
            is_valid_booking: is_valid(booking, now),
            latest_action: event.action,
            changed_at: event.changed_at,
            sequence: event.sequence,
        }
    }

    /// Version of the source event this row was derived from.
    pub fn version(&self) -> (DateTime<Utc>, u64) {
        (self.changed_at, self.sequence)
    }

    /// Whether the booking still exists at the source.
    pub fn is_deleted(&self) -> bool {
        self.latest_action == ChangeAction::Delete
    }
}
