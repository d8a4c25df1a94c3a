//! Test snapshot store that is never reachable.

use async_trait::async_trait;
use questlog_core::error::DomainError;
use questlog_core::snapshot::{Snapshot, SnapshotRepository, SnapshotStatistics};
use uuid::Uuid;

/// A snapshot repository whose every call fails with a storage error.
/// Exercises the snapshot-path fallback.
#[derive(Debug)]
pub struct FailingSnapshotRepository;

fn unavailable() -> DomainError {
    DomainError::StorageUnavailable("snapshot store offline".into())
}

#[async_trait]
impl SnapshotRepository for FailingSnapshotRepository {
    async fn get_latest(&self, _character_id: Uuid) -> Result<Option<Snapshot>, DomainError> {
        Err(unavailable())
    }

    async fn save(&self, _snapshot: &Snapshot) -> Result<(), DomainError> {
        Err(unavailable())
    }

    async fn mark_previous_as_stale(&self, _character_id: Uuid) -> Result<(), DomainError> {
        Err(unavailable())
    }

    async fn list(&self, _character_id: Uuid) -> Result<Vec<Snapshot>, DomainError> {
        Err(unavailable())
    }

    async fn prune(&self, _keep_count: usize) -> Result<u64, DomainError> {
        Err(unavailable())
    }

    async fn statistics(&self) -> Result<SnapshotStatistics, DomainError> {
        Err(unavailable())
    }
}
