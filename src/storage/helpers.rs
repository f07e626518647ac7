//! Shared helpers for storage implementations.

use chrono::{DateTime, SecondsFormat, Utc};

/// Render a timestamp for storage.
///
/// Fixed microsecond precision keeps the lexicographic order of the
/// stored text aligned with chronological order, which the scan queries
/// rely on.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp back into UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("{raw}: {e}"))
}
