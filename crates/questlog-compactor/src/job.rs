//! One compactor run.

use std::sync::Arc;

use questlog_core::clock::Clock;
use questlog_engine::archival::{
    ArchivalCompactor, ArchivalPolicy, CompactionReport, EventStorageStatistics,
};
use questlog_event_store::{PgArchiveRepository, PgEventRepository, PgSnapshotRepository};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument};

use crate::error::AppError;

/// What a run did and the footprint it left behind.
#[derive(Debug, Clone, Serialize)]
pub struct CompactionSummary {
    /// What the compaction pass did.
    pub report: CompactionReport,
    /// Superseded snapshots deleted.
    pub snapshots_pruned: u64,
    /// Storage footprint after the run.
    pub statistics: EventStorageStatistics,
}

/// Builds a compactor over the `PostgreSQL` stores behind `pool`.
#[must_use]
pub fn pg_compactor(
    pool: &PgPool,
    policy: ArchivalPolicy,
    clock: Arc<dyn Clock>,
) -> ArchivalCompactor {
    ArchivalCompactor::new(
        Arc::new(PgEventRepository::new(pool.clone())),
        Arc::new(PgArchiveRepository::new(pool.clone())),
        Arc::new(PgSnapshotRepository::new(pool.clone())),
        clock,
        policy,
    )
}

/// Runs one compaction pass, prunes snapshots down to `snapshot_keep_count`
/// per character, and collects storage statistics.
///
/// # Errors
///
/// Returns `AppError::Domain` if any step fails. Work committed by earlier
/// steps stays committed.
#[instrument(skip(compactor))]
pub async fn run(
    compactor: &ArchivalCompactor,
    snapshot_keep_count: usize,
) -> Result<CompactionSummary, AppError> {
    let report = compactor.run().await?;
    let snapshots_pruned = compactor.prune_snapshots(snapshot_keep_count).await?;
    let statistics = compactor.storage_statistics().await?;

    info!(
        live_events = statistics.live_events,
        characters = statistics.characters,
        compressed_events = statistics.compressed_events,
        rollups = statistics.rollups,
        compression_ratio = statistics.compression_ratio,
        total_space_saved_bytes = statistics.total_space_saved_bytes,
        events_per_day = statistics.events_per_day,
        "storage statistics"
    );

    Ok(CompactionSummary {
        report,
        snapshots_pruned,
        statistics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use questlog_core::repository::EventRepository;
    use questlog_core::snapshot::{Snapshot, SnapshotRepository};
    use questlog_event_store::{
        InMemoryArchiveRepository, InMemoryEventRepository, InMemorySnapshotRepository,
    };
    use questlog_test_support::{FixedClock, stored_event};
    use serde_json::json;
    use uuid::Uuid;

    fn snapshot(character_id: Uuid, event_version: i64) -> Snapshot {
        Snapshot {
            id: Uuid::new_v4(),
            character_id,
            event_version,
            total_event_count: event_version,
            serialized_state: "{}".to_owned(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 16, 0, 0, 0).unwrap()
                + Duration::minutes(event_version),
            is_latest: true,
            state_size_bytes: 2,
            creation_duration_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_run_compacts_prunes_and_reports() {
        // Arrange
        let events = Arc::new(InMemoryEventRepository::new());
        let snapshots = Arc::new(InMemorySnapshotRepository::new());
        let archive = Arc::new(InMemoryArchiveRepository::new());
        let character_id = Uuid::new_v4();
        let seeded: Vec<_> = (1..=3)
            .map(|n| {
                stored_event(
                    character_id,
                    n,
                    "character.experience_gained",
                    json!({"ExperienceGained": {"amount": n * 10, "source": "quest"}}),
                )
            })
            .collect();
        events.append_events(character_id, 0, &seeded).await.unwrap();
        for version in 1..=3 {
            snapshots.publish(&snapshot(character_id, version)).await.unwrap();
        }
        let compactor = ArchivalCompactor::new(
            events,
            archive,
            snapshots.clone(),
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap())),
            ArchivalPolicy::default(),
        );

        // Act
        let summary = run(&compactor, 1).await.unwrap();

        // Assert
        assert_eq!(summary.report.compressed, 3);
        assert_eq!(summary.snapshots_pruned, 2);
        assert_eq!(snapshots.list(character_id).await.unwrap().len(), 1);
        assert_eq!(summary.statistics.live_events, 3);
        assert_eq!(summary.statistics.compressed_events, 3);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["report"]["compressed"], json!(3));
    }
}
