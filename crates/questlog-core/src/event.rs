//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::repository::StoredEvent;

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Type name for deserialization routing.
    pub event_type: String,
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: Uuid,
    /// Monotonically increasing version within the aggregate stream.
    pub sequence_number: i64,
    /// Correlation ID for tracing a command through its effects.
    pub correlation_id: Uuid,
    /// Causation ID linking this event to the event/command that caused it.
    pub causation_id: Uuid,
    /// Who issued the command that produced the event, if known.
    pub actor_id: Option<String>,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    /// Rebuilds the metadata of a stored event.
    #[must_use]
    pub fn from_stored(stored: &StoredEvent) -> Self {
        Self {
            event_id: stored.event_id,
            event_type: stored.event_type.clone(),
            aggregate_id: stored.aggregate_id,
            sequence_number: stored.sequence_number,
            correlation_id: stored.correlation_id,
            causation_id: stored.causation_id,
            actor_id: stored.actor_id.clone(),
            occurred_at: stored.occurred_at,
        }
    }
}

/// Trait that all domain events implement.
///
/// Each bounded context models its events as a closed enum; decoding from
/// storage and application to the aggregate are plain `match`es over it.
pub trait DomainEvent: Send + Sync + std::fmt::Debug + Sized {
    /// Returns the event type name (used for serialization routing).
    fn event_type(&self) -> &'static str;

    /// Serializes the event payload to JSON.
    fn to_payload(&self) -> serde_json::Value;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;

    /// Whether this event establishes the aggregate's identity. Every stream
    /// must start with one.
    fn is_creation(&self) -> bool;

    /// Decodes a stored event.
    ///
    /// Returns `Ok(None)` for event types this context does not recognize so
    /// that older code can replay streams written by newer code.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the event type is recognized
    /// but the payload does not match it.
    fn from_stored(stored: &StoredEvent) -> Result<Option<Self>, DomainError>;

    /// Converts the event into its storage representation.
    fn to_stored_event(&self) -> StoredEvent {
        let meta = self.metadata();
        StoredEvent {
            event_id: meta.event_id,
            aggregate_id: meta.aggregate_id,
            event_type: self.event_type().to_owned(),
            payload: self.to_payload(),
            sequence_number: meta.sequence_number,
            correlation_id: meta.correlation_id,
            causation_id: meta.causation_id,
            actor_id: meta.actor_id.clone(),
            occurred_at: meta.occurred_at,
        }
    }
}
