//! Per-movie aggregate insights over the enriched booking view.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{BookingStatus, EnrichedBooking};

/// Cumulative CDC action counters for one movie.
///
/// Insert and update actions are tallied from change metadata as events
/// are observed, independent of the current row state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTally {
    pub new_bookings: u64,
    pub changed_bookings: u64,
}

/// Aggregate KPIs for a single movie.
///
/// Counts and rates cover bookings whose latest action is not DELETE;
/// revenue figures cover only rows that pass validation. Deleted and
/// invalid rows still feed the deleted count and the quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieInsight {
    pub movie_id: String,
    pub total_bookings: u64,
    pub valid_bookings: u64,
    pub invalid_bookings: u64,
    pub new_bookings: u64,
    pub changed_bookings: u64,
    pub deleted_bookings: u64,
    pub active_revenue: Decimal,
    pub lost_revenue: Decimal,
    pub gross_revenue: Decimal,
    pub avg_revenue: Decimal,
    /// Percentage of live bookings that are CANCELLED.
    pub cancellation_rate: f64,
    /// Percentage of live bookings that are BOOKED.
    pub active_rate: f64,
    /// Percentage of live bookings passing validation.
    pub data_quality_score: f64,
    /// Distinct calendar dates with at least one valid active booking.
    pub booking_days: Vec<NaiveDate>,
    /// Distinct hours of day with at least one valid active booking.
    pub booking_hours: Vec<u32>,
    pub computed_at: DateTime<Utc>,
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

impl MovieInsight {
    /// Recompute the insight for one movie from its current enriched rows.
    ///
    /// `rows` must be every enriched row for the movie, deleted ones
    /// included. `tally` carries the cumulative insert/update counters
    /// maintained by the aggregation stage.
    pub fn compute<'a, I>(
        movie_id: &str,
        rows: I,
        tally: ActionTally,
        now: DateTime<Utc>,
    ) -> Self
    where
        I: IntoIterator<Item = &'a EnrichedBooking>,
    {
        let mut total = 0u64;
        let mut valid = 0u64;
        let mut deleted = 0u64;
        let mut active = 0u64;
        let mut cancelled = 0u64;
        let mut active_revenue = Decimal::ZERO;
        let mut lost_revenue = Decimal::ZERO;
        let mut days = BTreeSet::new();
        let mut hours = BTreeSet::new();

        for row in rows {
            if row.is_deleted() {
                deleted += 1;
                continue;
            }
            total += 1;
            match row.status {
                BookingStatus::Booked => active += 1,
                BookingStatus::Cancelled => cancelled += 1,
            }
            if row.is_valid_booking {
                valid += 1;
                active_revenue += row.active_revenue;
                lost_revenue += row.lost_revenue;
                if row.status == BookingStatus::Booked {
                    days.insert(row.booking_date.date_naive());
                    hours.insert(row.booking_date.hour());
                }
            }
        }

        let gross_revenue = active_revenue + lost_revenue;
        let avg_revenue = if valid == 0 {
            Decimal::ZERO
        } else {
            gross_revenue / Decimal::from(valid)
        };

        Self {
            movie_id: movie_id.to_string(),
            total_bookings: total,
            valid_bookings: valid,
            invalid_bookings: total - valid,
            new_bookings: tally.new_bookings,
            changed_bookings: tally.changed_bookings,
            deleted_bookings: deleted,
            active_revenue,
            lost_revenue,
            gross_revenue,
            avg_revenue,
            cancellation_rate: percent(cancelled, total),
            active_rate: percent(active, total),
            data_quality_score: percent(valid, total),
            booking_days: days.into_iter().collect(),
            booking_hours: hours.into_iter().collect(),
            computed_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Booking, ChangeAction, ChangeEvent};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn enriched(
        id: &str,
        status: BookingStatus,
        count: i64,
        price: Decimal,
        action: ChangeAction,
    ) -> EnrichedBooking {
        let now = Utc::now();
        let booking = Booking {
            booking_id: id.into(),
            customer_id: format!("c-{id}"),
            movie_id: "m-1".into(),
            booking_date: now - Duration::days(1),
            status,
            ticket_count: count,
            ticket_price: price,
            total_amount: Decimal::from(count) * price,
            created_at: now,
            updated_at: now,
        };
        EnrichedBooking::derive(
            &ChangeEvent {
                sequence: 1,
                action,
                is_update: action == ChangeAction::Update,
                changed_at: now,
                booking,
            },
            now,
        )
    }

    fn invalid(id: &str) -> EnrichedBooking {
        let mut row = enriched(id, BookingStatus::Booked, 1, dec!(10), ChangeAction::Insert);
        row.ticket_count = -1;
        row.is_valid_booking = false;
        row
    }

    #[test]
    fn test_data_quality_score() {
        let mut rows: Vec<EnrichedBooking> = (0..8)
            .map(|i| {
                enriched(
                    &format!("b-{i}"),
                    BookingStatus::Booked,
                    1,
                    dec!(10),
                    ChangeAction::Insert,
                )
            })
            .collect();
        rows.push(invalid("b-8"));
        rows.push(invalid("b-9"));

        let insight =
            MovieInsight::compute("m-1", rows.iter(), ActionTally::default(), Utc::now());
        assert_eq!(insight.total_bookings, 10);
        assert_eq!(insight.valid_bookings, 8);
        assert_eq!(insight.invalid_bookings, 2);
        assert_eq!(insight.data_quality_score, 80.0);
    }

    #[test]
    fn test_rates_and_revenue() {
        let rows = vec![
            enriched("b-1", BookingStatus::Booked, 2, dec!(100), ChangeAction::Insert),
            enriched("b-2", BookingStatus::Booked, 1, dec!(50), ChangeAction::Insert),
            enriched(
                "b-3",
                BookingStatus::Cancelled,
                1,
                dec!(25),
                ChangeAction::Update,
            ),
            enriched("b-4", BookingStatus::Booked, 3, dec!(10), ChangeAction::Delete),
        ];

        let insight =
            MovieInsight::compute("m-1", rows.iter(), ActionTally::default(), Utc::now());
        // The deleted row leaves all live totals.
        assert_eq!(insight.total_bookings, 3);
        assert_eq!(insight.deleted_bookings, 1);
        assert_eq!(insight.active_revenue, dec!(250));
        assert_eq!(insight.lost_revenue, dec!(25));
        assert_eq!(insight.gross_revenue, dec!(275));
        assert!((insight.cancellation_rate - 100.0 / 3.0).abs() < 1e-9);
        assert!((insight.active_rate - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_rows_excluded_from_revenue_but_counted() {
        let rows = vec![
            enriched("b-1", BookingStatus::Booked, 2, dec!(100), ChangeAction::Insert),
            invalid("b-2"),
        ];

        let insight =
            MovieInsight::compute("m-1", rows.iter(), ActionTally::default(), Utc::now());
        assert_eq!(insight.total_bookings, 2);
        assert_eq!(insight.invalid_bookings, 1);
        assert_eq!(insight.active_revenue, dec!(200));
        assert_eq!(insight.data_quality_score, 50.0);
    }

    #[test]
    fn test_average_revenue_over_valid_rows() {
        let rows = vec![
            enriched("b-1", BookingStatus::Booked, 1, dec!(100), ChangeAction::Insert),
            enriched(
                "b-2",
                BookingStatus::Cancelled,
                1,
                dec!(50),
                ChangeAction::Update,
            ),
        ];
        let insight =
            MovieInsight::compute("m-1", rows.iter(), ActionTally::default(), Utc::now());
        assert_eq!(insight.avg_revenue, dec!(75));
    }

    #[test]
    fn test_empty_movie_has_zero_rates() {
        let insight = MovieInsight::compute(
            "m-1",
            std::iter::empty::<&EnrichedBooking>(),
            ActionTally::default(),
            Utc::now(),
        );
        assert_eq!(insight.total_bookings, 0);
        assert_eq!(insight.cancellation_rate, 0.0);
        assert_eq!(insight.active_rate, 0.0);
        assert_eq!(insight.data_quality_score, 0.0);
        assert_eq!(insight.avg_revenue, Decimal::ZERO);
    }

    #[test]
    fn test_booking_days_and_hours_distinct() {
        let mut rows = Vec::new();
        for (day, hour) in [(1, 18), (1, 18), (2, 20)] {
            let mut row = enriched(
                &format!("b-{day}-{hour}-{}", rows.len()),
                BookingStatus::Booked,
                1,
                dec!(10),
                ChangeAction::Insert,
            );
            row.booking_date = Utc
                .with_ymd_and_hms(2024, 3, day, hour, 15, 0)
                .unwrap();
            rows.push(row);
        }

        let insight =
            MovieInsight::compute("m-1", rows.iter(), ActionTally::default(), Utc::now());
        assert_eq!(insight.booking_days.len(), 2);
        assert_eq!(insight.booking_hours, vec![18, 20]);
    }
}
