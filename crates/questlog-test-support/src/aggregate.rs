//! A minimal event-sourced aggregate for exercising the engine in
//! isolation from any bounded context.

use chrono::{DateTime, TimeZone, Utc};
use questlog_core::aggregate::AggregateRoot;
use questlog_core::error::DomainError;
use questlog_core::event::{DomainEvent, EventMetadata};
use questlog_core::repository::StoredEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type of the creation event.
pub const TALLY_OPENED: &str = "tally.opened";
/// Event type of the increment event.
pub const TALLY_INCREMENTED: &str = "tally.incremented";

/// Payload variants of the tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TallyEventKind {
    /// The tally was created under a label.
    Opened {
        /// Display label.
        label: String,
    },
    /// The total was increased.
    Incremented {
        /// Amount added.
        by: i64,
    },
}

/// Event envelope of the tally.
#[derive(Debug, Clone)]
pub struct TallyEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: TallyEventKind,
}

impl DomainEvent for TallyEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            TallyEventKind::Opened { .. } => TALLY_OPENED,
            TallyEventKind::Incremented { .. } => TALLY_INCREMENTED,
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(&self.kind).expect("TallyEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn is_creation(&self) -> bool {
        matches!(self.kind, TallyEventKind::Opened { .. })
    }

    fn from_stored(stored: &StoredEvent) -> Result<Option<Self>, DomainError> {
        if stored.event_type != TALLY_OPENED && stored.event_type != TALLY_INCREMENTED {
            return Ok(None);
        }
        let kind: TallyEventKind = serde_json::from_value(stored.payload.clone())?;
        Ok(Some(Self {
            metadata: EventMetadata::from_stored(stored),
            kind,
        }))
    }
}

/// A labelled running total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Current version.
    pub version: i64,
    /// Label set at creation.
    pub label: Option<String>,
    /// Sum of all increments.
    pub total: i64,
    #[serde(skip)]
    uncommitted_events: Vec<TallyEvent>,
}

impl PartialEq for TallyEvent {
    fn eq(&self, other: &Self) -> bool {
        self.metadata == other.metadata && self.kind == other.kind
    }
}

impl Eq for TallyEvent {}

impl Tally {
    fn record(&mut self, kind: TallyEventKind) {
        let sequence_number = self.version
            + i64::try_from(self.uncommitted_events.len()).unwrap_or(i64::MAX)
            + 1;
        let correlation_id = Uuid::new_v4();
        let mut event = TallyEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: String::new(),
                aggregate_id: self.id,
                sequence_number,
                correlation_id,
                causation_id: correlation_id,
                actor_id: None,
                occurred_at: Utc::now(),
            },
            kind,
        };
        event.metadata.event_type = event.event_type().to_owned();
        self.uncommitted_events.push(event);
    }

    /// Records the creation event.
    pub fn open(&mut self, label: &str) {
        self.record(TallyEventKind::Opened {
            label: label.to_owned(),
        });
    }

    /// Records an increment.
    pub fn increment(&mut self, by: i64) {
        self.record(TallyEventKind::Incremented { by });
    }
}

impl AggregateRoot for Tally {
    type Event = TallyEvent;

    fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            label: None,
            total: 0,
            uncommitted_events: Vec::new(),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            TallyEventKind::Opened { label } => self.label = Some(label.clone()),
            TallyEventKind::Incremented { by } => self.total += by,
        }
        self.version = event.metadata.sequence_number;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn take_uncommitted_events(&mut self) -> Vec<Self::Event> {
        std::mem::take(&mut self.uncommitted_events)
    }
}

/// Builds a stored event for `aggregate_id` with a fixed timestamp derived
/// from the sequence number. Handy for seeding repositories directly.
#[must_use]
pub fn stored_event(
    aggregate_id: Uuid,
    sequence_number: i64,
    event_type: &str,
    payload: serde_json::Value,
) -> StoredEvent {
    let base: DateTime<Utc> = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
    StoredEvent {
        event_id: Uuid::new_v4(),
        aggregate_id,
        event_type: event_type.to_owned(),
        payload,
        sequence_number,
        correlation_id: Uuid::new_v4(),
        causation_id: Uuid::new_v4(),
        actor_id: None,
        occurred_at: base + chrono::Duration::seconds(sequence_number),
    }
}
