//! Snapshot store abstraction.
//!
//! A snapshot is a serialized aggregate state at a known event version. It
//! is purely a read optimization: the event log stays the source of truth,
//! and any snapshot can be discarded without losing data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;

/// A point-in-time materialization of a character's state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Snapshot identifier.
    pub id: Uuid,
    /// The character (aggregate) this snapshot belongs to.
    pub character_id: Uuid,
    /// Sequence number of the last event folded into the state.
    pub event_version: i64,
    /// Number of events the state was built from.
    pub total_event_count: i64,
    /// JSON-serialized aggregate state.
    pub serialized_state: String,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
    /// Whether this is the snapshot readers should use.
    pub is_latest: bool,
    /// Length of `serialized_state` in bytes.
    pub state_size_bytes: i64,
    /// How long reconstruction plus serialization took.
    pub creation_duration_ms: i64,
}

/// Aggregate counts and sizes for monitoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotStatistics {
    /// All stored snapshots, stale or not.
    pub total_snapshots: u64,
    /// Snapshots flagged `is_latest`.
    pub latest_snapshots: u64,
    /// Distinct characters with at least one snapshot.
    pub characters_with_snapshots: u64,
    /// Sum of `state_size_bytes`.
    pub total_state_bytes: u64,
    /// Mean `state_size_bytes`, zero when there are no snapshots.
    pub average_state_bytes: f64,
    /// Mean `creation_duration_ms`, zero when there are no snapshots.
    pub average_creation_ms: f64,
    /// Creation time of the oldest snapshot.
    pub oldest_snapshot_at: Option<DateTime<Utc>>,
    /// Creation time of the newest snapshot.
    pub newest_snapshot_at: Option<DateTime<Utc>>,
}

/// Repository trait for persisting and querying snapshots.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Returns the snapshot flagged `is_latest` for a character, if any.
    async fn get_latest(&self, character_id: Uuid) -> Result<Option<Snapshot>, DomainError>;

    /// Durably inserts a snapshot as-is.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), DomainError>;

    /// Clears `is_latest` on every stored snapshot of the character.
    async fn mark_previous_as_stale(&self, character_id: Uuid) -> Result<(), DomainError>;

    /// Makes `snapshot` the single latest snapshot of its character.
    ///
    /// The default runs stale-marking before the insert, so a crash in
    /// between leaves no latest snapshot rather than two. Backends that can
    /// do both in one transaction override it.
    async fn publish(&self, snapshot: &Snapshot) -> Result<(), DomainError> {
        self.mark_previous_as_stale(snapshot.character_id).await?;
        self.save(snapshot).await
    }

    /// All snapshots of a character, newest first.
    async fn list(&self, character_id: Uuid) -> Result<Vec<Snapshot>, DomainError>;

    /// Deletes all but the `keep_count` most recent snapshots of every
    /// character and returns how many were deleted. The latest snapshot is
    /// always kept.
    async fn prune(&self, keep_count: usize) -> Result<u64, DomainError>;

    /// Aggregate counts and sizes.
    async fn statistics(&self) -> Result<SnapshotStatistics, DomainError>;
}
