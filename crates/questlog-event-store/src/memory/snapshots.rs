//! In-process snapshot store.

use std::collections::HashMap;

use async_trait::async_trait;
use questlog_core::error::DomainError;
use questlog_core::snapshot::{Snapshot, SnapshotRepository, SnapshotStatistics};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Snapshot store held in memory, keyed by character.
#[derive(Debug, Default)]
pub struct InMemorySnapshotRepository {
    snapshots: RwLock<HashMap<Uuid, Vec<Snapshot>>>,
}

impl InMemorySnapshotRepository {
    /// Creates an empty snapshot store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the serialized state of a stored snapshot. Lets tests
    /// simulate on-disk corruption.
    pub async fn overwrite_state(&self, snapshot_id: Uuid, serialized_state: &str) -> bool {
        let mut snapshots = self.snapshots.write().await;
        for snapshot in snapshots.values_mut().flatten() {
            if snapshot.id == snapshot_id {
                serialized_state.clone_into(&mut snapshot.serialized_state);
                return true;
            }
        }
        false
    }
}

/// Newest first: highest event version, then most recent creation.
fn newest_first(a: &Snapshot, b: &Snapshot) -> std::cmp::Ordering {
    b.event_version
        .cmp(&a.event_version)
        .then(b.created_at.cmp(&a.created_at))
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn get_latest(&self, character_id: Uuid) -> Result<Option<Snapshot>, DomainError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .get(&character_id)
            .and_then(|list| list.iter().find(|s| s.is_latest).cloned()))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), DomainError> {
        let mut snapshots = self.snapshots.write().await;
        snapshots
            .entry(snapshot.character_id)
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn mark_previous_as_stale(&self, character_id: Uuid) -> Result<(), DomainError> {
        let mut snapshots = self.snapshots.write().await;
        if let Some(list) = snapshots.get_mut(&character_id) {
            for snapshot in list {
                snapshot.is_latest = false;
            }
        }
        Ok(())
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<(), DomainError> {
        let mut snapshots = self.snapshots.write().await;
        let list = snapshots.entry(snapshot.character_id).or_default();
        for previous in list.iter_mut() {
            previous.is_latest = false;
        }
        let mut latest = snapshot.clone();
        latest.is_latest = true;
        list.push(latest);
        Ok(())
    }

    async fn list(&self, character_id: Uuid) -> Result<Vec<Snapshot>, DomainError> {
        let snapshots = self.snapshots.read().await;
        let mut list = snapshots.get(&character_id).cloned().unwrap_or_default();
        list.sort_by(newest_first);
        Ok(list)
    }

    async fn prune(&self, keep_count: usize) -> Result<u64, DomainError> {
        let keep_count = keep_count.max(1);
        let mut snapshots = self.snapshots.write().await;
        let mut deleted = 0u64;
        for list in snapshots.values_mut() {
            list.sort_by(newest_first);
            let before = list.len();
            let mut rank = 0usize;
            list.retain(|snapshot| {
                rank += 1;
                rank <= keep_count || snapshot.is_latest
            });
            deleted += (before - list.len()) as u64;
        }
        snapshots.retain(|_, list| !list.is_empty());
        Ok(deleted)
    }

    #[allow(clippy::cast_precision_loss)]
    async fn statistics(&self) -> Result<SnapshotStatistics, DomainError> {
        let snapshots = self.snapshots.read().await;
        let mut stats = SnapshotStatistics::default();
        let mut total_ms = 0u64;
        for list in snapshots.values().filter(|l| !l.is_empty()) {
            stats.characters_with_snapshots += 1;
            for snapshot in list {
                stats.total_snapshots += 1;
                if snapshot.is_latest {
                    stats.latest_snapshots += 1;
                }
                stats.total_state_bytes += u64::try_from(snapshot.state_size_bytes).unwrap_or(0);
                total_ms += u64::try_from(snapshot.creation_duration_ms).unwrap_or(0);
                stats.oldest_snapshot_at = Some(
                    stats
                        .oldest_snapshot_at
                        .map_or(snapshot.created_at, |t| t.min(snapshot.created_at)),
                );
                stats.newest_snapshot_at = Some(
                    stats
                        .newest_snapshot_at
                        .map_or(snapshot.created_at, |t| t.max(snapshot.created_at)),
                );
            }
        }
        if stats.total_snapshots > 0 {
            stats.average_state_bytes = stats.total_state_bytes as f64 / stats.total_snapshots as f64;
            stats.average_creation_ms = total_ms as f64 / stats.total_snapshots as f64;
        }
        Ok(stats)
    }
}
