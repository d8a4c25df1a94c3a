//! In-process event log.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use questlog_core::error::DomainError;
use questlog_core::repository::{
    EventLogTotals, EventRepository, ScanCursor, StoredEvent, check_contiguous,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Stream {
    /// Highest sequence number ever appended. Survives archival removal of
    /// older rows so the next append still sees the true head.
    head: i64,
    events: BTreeMap<i64, StoredEvent>,
}

/// Event log held in memory.
///
/// Appends take the write lock for the whole batch, so a batch is visible
/// entirely or not at all, and the `(aggregate_id, sequence_number)` pair is
/// unique exactly as in the database.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    streams: RwLock<HashMap<Uuid, Stream>>,
}

impl InMemoryEventRepository {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        self.load_events_since(aggregate_id, 0).await
    }

    async fn load_events_since(
        &self,
        aggregate_id: Uuid,
        from_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(&aggregate_id)
            .map(|stream| {
                stream
                    .events
                    .range(from_version.saturating_add(1)..)
                    .map(|(_, event)| event.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }
        check_contiguous(aggregate_id, expected_version, events)?;

        let mut streams = self.streams.write().await;
        let stream = streams.entry(aggregate_id).or_default();
        if stream.head != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: stream.head,
            });
        }

        for event in events {
            stream.events.insert(event.sequence_number, event.clone());
        }
        stream.head = expected_version + i64::try_from(events.len()).unwrap_or(i64::MAX);

        tracing::debug!(%aggregate_id, head = stream.head, count = events.len(), "appended events");
        Ok(())
    }

    async fn load_events_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<ScanCursor>,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let streams = self.streams.read().await;
        let mut old: Vec<StoredEvent> = streams
            .values()
            .flat_map(|stream| stream.events.values())
            .filter(|event| event.occurred_at < cutoff)
            .filter(|event| after.is_none_or(|cursor| ScanCursor::at(event) > cursor))
            .cloned()
            .collect();
        old.sort_by_key(ScanCursor::at);
        old.truncate(limit);
        Ok(old)
    }

    async fn remove_events(
        &self,
        aggregate_id: Uuid,
        event_ids: &[Uuid],
    ) -> Result<u64, DomainError> {
        let mut streams = self.streams.write().await;
        let Some(stream) = streams.get_mut(&aggregate_id) else {
            return Ok(0);
        };
        let before = stream.events.len();
        stream
            .events
            .retain(|_, event| !event_ids.contains(&event.event_id));
        Ok((before - stream.events.len()) as u64)
    }

    async fn totals(&self) -> Result<EventLogTotals, DomainError> {
        let streams = self.streams.read().await;
        let mut totals = EventLogTotals::default();
        for stream in streams.values().filter(|s| !s.events.is_empty()) {
            totals.aggregate_count += 1;
            for event in stream.events.values() {
                totals.event_count += 1;
                totals.payload_bytes += event.payload_size_bytes() as u64;
                totals.first_event_at = Some(
                    totals
                        .first_event_at
                        .map_or(event.occurred_at, |t| t.min(event.occurred_at)),
                );
                totals.last_event_at = Some(
                    totals
                        .last_event_at
                        .map_or(event.occurred_at, |t| t.max(event.occurred_at)),
                );
            }
        }
        Ok(totals)
    }
}
