//! Archive store abstraction: cold-storage forms of old events.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;

/// A single event whose payload has been compressed for cold storage.
///
/// Keeps the full event envelope so the original `StoredEvent` can be
/// restored exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedEvent {
    /// Record identifier.
    pub id: Uuid,
    /// The character (aggregate) the event belongs to.
    pub character_id: Uuid,
    /// Identifier of the original event.
    pub original_event_id: Uuid,
    /// Event type of the original event.
    pub event_type: String,
    /// Sequence number of the original event.
    pub sequence_number: i64,
    /// Correlation ID of the original event.
    pub correlation_id: Uuid,
    /// Causation ID of the original event.
    pub causation_id: Uuid,
    /// Actor of the original event.
    pub actor_id: Option<String>,
    /// Deflate-compressed JSON payload.
    pub compressed_payload: Vec<u8>,
    /// Size of the JSON payload before compression.
    pub original_size_bytes: i64,
    /// Size of `compressed_payload`.
    pub compressed_size_bytes: i64,
    /// Hex SHA-256 of the uncompressed JSON payload.
    pub payload_checksum: String,
    /// When the original event occurred.
    pub original_timestamp: DateTime<Utc>,
    /// When the event was archived.
    pub archived_at: DateTime<Utc>,
}

impl CompressedEvent {
    /// Bytes saved by compressing this event (never negative).
    #[must_use]
    pub fn space_saved_bytes(&self) -> i64 {
        (self.original_size_bytes - self.compressed_size_bytes).max(0)
    }
}

/// A lossy summary of a run of same-type events within a time window.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRollup {
    /// Record identifier.
    pub id: Uuid,
    /// The character (aggregate) the events belong to.
    pub character_id: Uuid,
    /// Event type shared by every summarized event.
    pub event_type: String,
    /// Number of events summarized.
    pub event_count: i64,
    /// Timestamp of the earliest summarized event.
    pub start_timestamp: DateTime<Utc>,
    /// Timestamp of the latest summarized event.
    pub end_timestamp: DateTime<Utc>,
    /// Counts and numeric aggregates over the summarized payloads.
    pub aggregated_payload: serde_json::Value,
    /// Identifiers of every summarized event, in event order.
    pub original_event_ids: Vec<Uuid>,
    /// Original payload bytes minus the summary's payload bytes.
    pub space_saved_bytes: i64,
    /// When the rollup was created.
    pub created_at: DateTime<Utc>,
}

impl EventRollup {
    /// Identifiers of every event this rollup replaced.
    #[must_use]
    pub fn original_event_ids(&self) -> &[Uuid] {
        &self.original_event_ids
    }
}

/// Totals over the archive tables, used for storage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveTotals {
    /// Number of compressed events.
    pub compressed_events: u64,
    /// Sum of `original_size_bytes` over compressed events.
    pub compressed_original_bytes: u64,
    /// Sum of `compressed_size_bytes` over compressed events.
    pub compressed_bytes: u64,
    /// Number of rollups.
    pub rollups: u64,
    /// Number of events summarized by rollups.
    pub rolled_up_events: u64,
    /// Sum of `space_saved_bytes` over rollups.
    pub rollup_saved_bytes: u64,
}

/// Repository trait for compacted event storage.
#[async_trait]
pub trait ArchiveRepository: Send + Sync {
    /// Durably stores compressed events; all or none.
    async fn save_compressed(&self, events: &[CompressedEvent]) -> Result<(), DomainError>;

    /// Durably stores one rollup.
    async fn save_rollup(&self, rollup: &EventRollup) -> Result<(), DomainError>;

    /// Compressed events of a character, ordered by sequence number.
    async fn load_compressed(&self, character_id: Uuid)
    -> Result<Vec<CompressedEvent>, DomainError>;

    /// Rollups of a character, ordered by start timestamp.
    async fn load_rollups(&self, character_id: Uuid) -> Result<Vec<EventRollup>, DomainError>;

    /// Identifiers of every original event of a character referenced by a
    /// compressed event or a rollup.
    async fn archived_event_ids(&self, character_id: Uuid) -> Result<HashSet<Uuid>, DomainError>;

    /// Totals over the archive.
    async fn totals(&self) -> Result<ArchiveTotals, DomainError>;
}
