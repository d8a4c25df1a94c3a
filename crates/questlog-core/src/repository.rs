//! Event repository abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Sequence number within the aggregate stream, starting at 1.
    pub sequence_number: i64,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Who issued the command that produced the event, if known.
    pub actor_id: Option<String>,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Size of the JSON-encoded payload in bytes.
    #[must_use]
    pub fn payload_size_bytes(&self) -> usize {
        serde_json::to_vec(&self.payload).map_or(0, |bytes| bytes.len())
    }
}

/// Position in the archival scan order `(occurred_at, aggregate_id,
/// sequence_number)`. A scan resumed from a cursor returns only events that
/// sort strictly after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScanCursor {
    /// Timestamp of the event the cursor sits on.
    pub occurred_at: DateTime<Utc>,
    /// Aggregate of that event.
    pub aggregate_id: Uuid,
    /// Sequence number of that event.
    pub sequence_number: i64,
}

impl ScanCursor {
    /// The cursor sitting on `event`.
    #[must_use]
    pub fn at(event: &StoredEvent) -> Self {
        Self {
            occurred_at: event.occurred_at,
            aggregate_id: event.aggregate_id,
            sequence_number: event.sequence_number,
        }
    }
}

/// Totals over the live event log, used for storage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLogTotals {
    /// Number of events currently in the log.
    pub event_count: u64,
    /// Sum of JSON payload sizes.
    pub payload_bytes: u64,
    /// Number of distinct aggregates with at least one event.
    pub aggregate_count: u64,
    /// Timestamp of the oldest live event.
    pub first_event_at: Option<DateTime<Utc>>,
    /// Timestamp of the newest live event.
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Repository trait for loading and appending domain events.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Load all events for a given aggregate, ordered by sequence number.
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError>;

    /// Load the events of an aggregate with a sequence number strictly
    /// greater than `from_version`, ordered by sequence number.
    async fn load_events_since(
        &self,
        aggregate_id: Uuid,
        from_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Append new events to an aggregate stream with optimistic concurrency.
    /// `expected_version` is the last known sequence number.
    ///
    /// All events are written or none are. Events must carry the sequence
    /// numbers `expected_version + 1`, `expected_version + 2`, ... in order.
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError>;

    /// Load up to `limit` events (across all aggregates) that occurred before
    /// `cutoff`, in [`ScanCursor`] order, starting after `after` when given.
    /// Only the archival compactor scans this way.
    async fn load_events_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<ScanCursor>,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Removes the given events of one aggregate from the live log and
    /// returns how many rows were removed. Only the archival compactor calls
    /// this, after the compacted form is committed.
    async fn remove_events(
        &self,
        aggregate_id: Uuid,
        event_ids: &[Uuid],
    ) -> Result<u64, DomainError>;

    /// Totals over the live event log.
    async fn totals(&self) -> Result<EventLogTotals, DomainError>;
}

/// Checks that `events` carry the sequence numbers directly following
/// `expected_version` and all belong to `aggregate_id`.
///
/// Backends call this before touching storage so that malformed batches are
/// rejected as validation errors rather than as conflicts.
///
/// # Errors
///
/// Returns `DomainError::Validation` describing the first offending event.
pub fn check_contiguous(
    aggregate_id: Uuid,
    expected_version: i64,
    events: &[StoredEvent],
) -> Result<(), DomainError> {
    let mut next = expected_version + 1;
    for event in events {
        if event.aggregate_id != aggregate_id {
            return Err(DomainError::Validation(format!(
                "event {} belongs to aggregate {}, not {aggregate_id}",
                event.event_id, event.aggregate_id
            )));
        }
        if event.sequence_number != next {
            return Err(DomainError::Validation(format!(
                "event {} has sequence number {}, expected {next}",
                event.event_id, event.sequence_number
            )));
        }
        next += 1;
    }
    Ok(())
}
