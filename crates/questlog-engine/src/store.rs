//! The load/save seam used by command handlers.

use async_trait::async_trait;
use questlog_core::aggregate::AggregateRoot;
use questlog_core::error::DomainError;
use questlog_core::repository::StoredEvent;
use uuid::Uuid;

/// Loads aggregates and persists their pending events.
///
/// Implemented by [`ReplayRepository`](crate::ReplayRepository), which always
/// folds the full stream, and by
/// [`SnapshotAwareRepository`](crate::SnapshotAwareRepository), which starts
/// from the latest snapshot when one is usable.
#[async_trait]
pub trait AggregateStore<A: AggregateRoot>: Send + Sync {
    /// Rebuilds the aggregate from storage.
    ///
    /// # Errors
    ///
    /// `AggregateNotFound` when the stream is empty, `CorruptAggregate` when
    /// it cannot be folded, `StorageUnavailable` when the log is unreachable.
    async fn load(&self, aggregate_id: Uuid) -> Result<A, DomainError>;

    /// Persists the aggregate's pending events and applies them to it.
    ///
    /// Returns the committed events. An aggregate with nothing pending is
    /// left untouched and nothing is written.
    ///
    /// # Errors
    ///
    /// `ConcurrencyConflict` when another writer got there first,
    /// `StorageUnavailable` when the append fails.
    async fn save(
        &self,
        aggregate: &mut A,
        actor_id: Option<&str>,
    ) -> Result<Vec<StoredEvent>, DomainError>;
}
