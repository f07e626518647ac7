//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query
//! building.

use sea_query::Iden;

/// Change capture log table schema.
#[derive(Iden)]
pub enum Changes {
    Table,
    #[iden = "sequence"]
    Sequence,
    #[iden = "booking_id"]
    BookingId,
    #[iden = "action"]
    Action,
    #[iden = "is_update"]
    IsUpdate,
    #[iden = "changed_at"]
    ChangedAt,
    #[iden = "payload"]
    Payload,
}

/// CDC event store table schema.
#[derive(Iden)]
pub enum Events {
    Table,
    #[iden = "booking_id"]
    BookingId,
    #[iden = "sequence"]
    Sequence,
    #[iden = "movie_id"]
    MovieId,
    #[iden = "action"]
    Action,
    #[iden = "is_update"]
    IsUpdate,
    #[iden = "changed_at"]
    ChangedAt,
    #[iden = "payload"]
    Payload,
}

/// Consumer cursor table schema.
#[derive(Iden)]
pub enum Cursors {
    Table,
    #[iden = "consumer"]
    Consumer,
    #[iden = "position"]
    Position,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// SQL for creating the change capture log table.
pub const CREATE_CHANGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS changes (
    sequence INTEGER PRIMARY KEY AUTOINCREMENT,
    booking_id TEXT NOT NULL,
    action TEXT NOT NULL,
    is_update INTEGER NOT NULL DEFAULT 0,
    changed_at TEXT NOT NULL,
    payload BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_changes_booking ON changes(booking_id);
"#;

/// SQL for creating the event store table.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    booking_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    movie_id TEXT NOT NULL,
    action TEXT NOT NULL,
    is_update INTEGER NOT NULL DEFAULT 0,
    changed_at TEXT NOT NULL,
    payload BLOB NOT NULL,
    PRIMARY KEY (booking_id, sequence)
);

CREATE INDEX IF NOT EXISTS idx_events_sequence ON events(sequence);
CREATE INDEX IF NOT EXISTS idx_events_movie ON events(movie_id);
"#;

/// SQL for creating the cursors table.
pub const CREATE_CURSORS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS cursors (
    consumer TEXT NOT NULL PRIMARY KEY,
    position INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
