//! In-process archive store.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use questlog_core::archive::{ArchiveRepository, ArchiveTotals, CompressedEvent, EventRollup};
use questlog_core::error::DomainError;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Archive {
    compressed: HashMap<Uuid, Vec<CompressedEvent>>,
    rollups: HashMap<Uuid, Vec<EventRollup>>,
}

/// Compressed events and rollups held in memory, keyed by character.
#[derive(Debug, Default)]
pub struct InMemoryArchiveRepository {
    archive: RwLock<Archive>,
}

impl InMemoryArchiveRepository {
    /// Creates an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArchiveRepository for InMemoryArchiveRepository {
    async fn save_compressed(&self, events: &[CompressedEvent]) -> Result<(), DomainError> {
        let mut archive = self.archive.write().await;
        let existing: HashSet<Uuid> = archive
            .compressed
            .values()
            .flatten()
            .map(|c| c.original_event_id)
            .collect();
        if let Some(duplicate) = events
            .iter()
            .find(|c| existing.contains(&c.original_event_id))
        {
            return Err(DomainError::Validation(format!(
                "event {} is already compressed",
                duplicate.original_event_id
            )));
        }
        for event in events {
            archive
                .compressed
                .entry(event.character_id)
                .or_default()
                .push(event.clone());
        }
        Ok(())
    }

    async fn save_rollup(&self, rollup: &EventRollup) -> Result<(), DomainError> {
        let mut archive = self.archive.write().await;
        archive
            .rollups
            .entry(rollup.character_id)
            .or_default()
            .push(rollup.clone());
        Ok(())
    }

    async fn load_compressed(
        &self,
        character_id: Uuid,
    ) -> Result<Vec<CompressedEvent>, DomainError> {
        let archive = self.archive.read().await;
        let mut events = archive
            .compressed
            .get(&character_id)
            .cloned()
            .unwrap_or_default();
        events.sort_by_key(|c| c.sequence_number);
        Ok(events)
    }

    async fn load_rollups(&self, character_id: Uuid) -> Result<Vec<EventRollup>, DomainError> {
        let archive = self.archive.read().await;
        let mut rollups = archive
            .rollups
            .get(&character_id)
            .cloned()
            .unwrap_or_default();
        rollups.sort_by_key(|r| r.start_timestamp);
        Ok(rollups)
    }

    async fn archived_event_ids(&self, character_id: Uuid) -> Result<HashSet<Uuid>, DomainError> {
        let archive = self.archive.read().await;
        let compressed = archive
            .compressed
            .get(&character_id)
            .into_iter()
            .flatten()
            .map(|c| c.original_event_id);
        let rolled_up = archive
            .rollups
            .get(&character_id)
            .into_iter()
            .flatten()
            .flat_map(|r| r.original_event_ids.iter().copied());
        Ok(compressed.chain(rolled_up).collect())
    }

    async fn totals(&self) -> Result<ArchiveTotals, DomainError> {
        let archive = self.archive.read().await;
        let mut totals = ArchiveTotals::default();
        for event in archive.compressed.values().flatten() {
            totals.compressed_events += 1;
            totals.compressed_original_bytes += u64::try_from(event.original_size_bytes).unwrap_or(0);
            totals.compressed_bytes += u64::try_from(event.compressed_size_bytes).unwrap_or(0);
        }
        for rollup in archive.rollups.values().flatten() {
            totals.rollups += 1;
            totals.rolled_up_events += u64::try_from(rollup.event_count).unwrap_or(0);
            totals.rollup_saved_bytes += u64::try_from(rollup.space_saved_bytes).unwrap_or(0);
        }
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn make_compressed(character_id: Uuid, sequence_number: i64) -> CompressedEvent {
        CompressedEvent {
            id: Uuid::new_v4(),
            character_id,
            original_event_id: Uuid::new_v4(),
            event_type: "character.experience_gained".to_owned(),
            sequence_number,
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            actor_id: None,
            compressed_payload: vec![1, 2, 3],
            original_size_bytes: 40,
            compressed_size_bytes: 3,
            payload_checksum: "0".repeat(64),
            original_timestamp: Utc::now(),
            archived_at: Utc::now(),
        }
    }

    fn make_rollup(character_id: Uuid, ids: Vec<Uuid>) -> EventRollup {
        EventRollup {
            id: Uuid::new_v4(),
            character_id,
            event_type: "character.damage_dealt".to_owned(),
            event_count: i64::try_from(ids.len()).unwrap(),
            start_timestamp: Utc::now(),
            end_timestamp: Utc::now(),
            aggregated_payload: serde_json::json!({"event_count": ids.len()}),
            original_event_ids: ids,
            space_saved_bytes: 100,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_archived_event_ids_cover_compressed_and_rolled_up_events() {
        let repo = InMemoryArchiveRepository::new();
        let character_id = Uuid::new_v4();
        let compressed = make_compressed(character_id, 1);
        let rolled = vec![Uuid::new_v4(), Uuid::new_v4()];
        repo.save_compressed(std::slice::from_ref(&compressed))
            .await
            .unwrap();
        repo.save_rollup(&make_rollup(character_id, rolled.clone()))
            .await
            .unwrap();

        let ids = repo.archived_event_ids(character_id).await.unwrap();

        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&compressed.original_event_id));
        assert!(rolled.iter().all(|id| ids.contains(id)));
        assert!(repo.archived_event_ids(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_compressed_rejects_duplicates_atomically() {
        let repo = InMemoryArchiveRepository::new();
        let character_id = Uuid::new_v4();
        let first = make_compressed(character_id, 1);
        repo.save_compressed(std::slice::from_ref(&first))
            .await
            .unwrap();

        let result = repo
            .save_compressed(&[make_compressed(character_id, 2), first])
            .await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(repo.load_compressed(character_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_totals_sum_sizes_and_counts() {
        let repo = InMemoryArchiveRepository::new();
        let character_id = Uuid::new_v4();
        repo.save_compressed(&[
            make_compressed(character_id, 2),
            make_compressed(character_id, 1),
        ])
        .await
        .unwrap();
        repo.save_rollup(&make_rollup(character_id, vec![Uuid::new_v4(); 4]))
            .await
            .unwrap();

        let totals = repo.totals().await.unwrap();

        assert_eq!(totals.compressed_events, 2);
        assert_eq!(totals.compressed_original_bytes, 80);
        assert_eq!(totals.compressed_bytes, 6);
        assert_eq!(totals.rollups, 1);
        assert_eq!(totals.rolled_up_events, 4);
        assert_eq!(totals.rollup_saved_bytes, 100);
        let loaded = repo.load_compressed(character_id).await.unwrap();
        assert_eq!(loaded[0].sequence_number, 1);
    }
}
