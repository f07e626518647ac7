//! In-memory event store and cursor store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::interfaces::event_store::{CursorStore, EventStore, Result};
use crate::model::ChangeEvent;

/// In-memory event store keyed by sequence.
///
/// Sequences are unique across the log, so presence of a sequence key is
/// exactly the (booking_id, sequence) dedup identity.
#[derive(Default)]
pub struct MemoryEventStore {
    events: RwLock<BTreeMap<u64, ChangeEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, events: Vec<ChangeEvent>) -> Result<usize> {
        let mut store = self.events.write().await;
        let mut appended = 0;
        for event in events {
            if store.contains_key(&event.sequence) {
                continue;
            }
            store.insert(event.sequence, event);
            appended += 1;
        }
        Ok(appended)
    }

    async fn scan_since(&self, sequence: u64) -> Result<Vec<ChangeEvent>> {
        let store = self.events.read().await;
        let mut events: Vec<ChangeEvent> = store
            .range(sequence + 1..)
            .map(|(_, e)| e.clone())
            .collect();
        events.sort_by_key(|e| e.version());
        Ok(events)
    }

    async fn head(&self) -> Result<u64> {
        let store = self.events.read().await;
        Ok(store.keys().next_back().copied().unwrap_or(0))
    }
}

/// In-memory cursor store.
#[derive(Default)]
pub struct MemoryCursorStore {
    cursors: RwLock<HashMap<String, u64>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self, consumer: &str) -> Result<Option<u64>> {
        Ok(self.cursors.read().await.get(consumer).copied())
    }

    async fn put(&self, consumer: &str, cursor: u64) -> Result<()> {
        self.cursors
            .write()
            .await
            .insert(consumer.to_string(), cursor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Booking, BookingStatus, ChangeAction};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn event(sequence: u64, id: &str) -> ChangeEvent {
        let now = Utc::now();
        ChangeEvent {
            sequence,
            action: ChangeAction::Insert,
            is_update: false,
            changed_at: now,
            booking: Booking {
                booking_id: id.into(),
                customer_id: "c-1".into(),
                movie_id: "m-1".into(),
                booking_date: now,
                status: BookingStatus::Booked,
                ticket_count: 1,
                ticket_price: dec!(10),
                total_amount: dec!(10),
                created_at: now,
                updated_at: now,
            },
        }
    }

    #[tokio::test]
    async fn test_append_deduplicates() {
        let store = MemoryEventStore::new();
        let e = event(1, "b-1");

        assert_eq!(store.append(vec![e.clone()]).await.unwrap(), 1);
        assert_eq!(store.append(vec![e]).await.unwrap(), 0);
        assert_eq!(store.scan_since(0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_since_is_exclusive_and_ordered() {
        let store = MemoryEventStore::new();
        store
            .append(vec![event(1, "b-1"), event(2, "b-2"), event(3, "b-3")])
            .await
            .unwrap();

        let events = store.scan_since(1).await.unwrap();
        assert_eq!(
            events.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(store.head().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = MemoryEventStore::new();
        assert_eq!(store.head().await.unwrap(), 0);
        assert!(store.scan_since(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cursor_store_round_trip() {
        let cursors = MemoryCursorStore::new();
        assert_eq!(cursors.get("ingest").await.unwrap(), None);

        cursors.put("ingest", 42).await.unwrap();
        assert_eq!(cursors.get("ingest").await.unwrap(), Some(42));

        cursors.put("ingest", 43).await.unwrap();
        assert_eq!(cursors.get("ingest").await.unwrap(), Some(43));
    }
}
