//! `PostgreSQL` implementation of the `ArchiveRepository` trait.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use questlog_core::archive::{ArchiveRepository, ArchiveTotals, CompressedEvent, EventRollup};
use questlog_core::error::DomainError;

use crate::error::{storage_error, to_u64};

const COMPRESSED_COLUMNS: &str = "id, character_id, original_event_id, event_type, \
     sequence_number, correlation_id, causation_id, actor_id, compressed_payload, \
     original_size_bytes, compressed_size_bytes, payload_checksum, original_timestamp, archived_at";

const ROLLUP_COLUMNS: &str = "id, character_id, event_type, event_count, start_timestamp, \
     end_timestamp, aggregated_payload, original_event_ids, space_saved_bytes, created_at";

#[derive(Debug, sqlx::FromRow)]
struct CompressedRow {
    id: Uuid,
    character_id: Uuid,
    original_event_id: Uuid,
    event_type: String,
    sequence_number: i64,
    correlation_id: Uuid,
    causation_id: Uuid,
    actor_id: Option<String>,
    compressed_payload: Vec<u8>,
    original_size_bytes: i64,
    compressed_size_bytes: i64,
    payload_checksum: String,
    original_timestamp: DateTime<Utc>,
    archived_at: DateTime<Utc>,
}

impl From<CompressedRow> for CompressedEvent {
    fn from(row: CompressedRow) -> Self {
        Self {
            id: row.id,
            character_id: row.character_id,
            original_event_id: row.original_event_id,
            event_type: row.event_type,
            sequence_number: row.sequence_number,
            correlation_id: row.correlation_id,
            causation_id: row.causation_id,
            actor_id: row.actor_id,
            compressed_payload: row.compressed_payload,
            original_size_bytes: row.original_size_bytes,
            compressed_size_bytes: row.compressed_size_bytes,
            payload_checksum: row.payload_checksum,
            original_timestamp: row.original_timestamp,
            archived_at: row.archived_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RollupRow {
    id: Uuid,
    character_id: Uuid,
    event_type: String,
    event_count: i64,
    start_timestamp: DateTime<Utc>,
    end_timestamp: DateTime<Utc>,
    aggregated_payload: serde_json::Value,
    original_event_ids: Vec<Uuid>,
    space_saved_bytes: i64,
    created_at: DateTime<Utc>,
}

impl From<RollupRow> for EventRollup {
    fn from(row: RollupRow) -> Self {
        Self {
            id: row.id,
            character_id: row.character_id,
            event_type: row.event_type,
            event_count: row.event_count,
            start_timestamp: row.start_timestamp,
            end_timestamp: row.end_timestamp,
            aggregated_payload: row.aggregated_payload,
            original_event_ids: row.original_event_ids,
            space_saved_bytes: row.space_saved_bytes,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL-backed archive repository.
#[derive(Debug, Clone)]
pub struct PgArchiveRepository {
    pool: PgPool,
}

impl PgArchiveRepository {
    /// Creates a new `PgArchiveRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArchiveRepository for PgArchiveRepository {
    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn save_compressed(&self, events: &[CompressedEvent]) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        for event in events {
            sqlx::query(&format!(
                "INSERT INTO compressed_events ({COMPRESSED_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
            ))
            .bind(event.id)
            .bind(event.character_id)
            .bind(event.original_event_id)
            .bind(&event.event_type)
            .bind(event.sequence_number)
            .bind(event.correlation_id)
            .bind(event.causation_id)
            .bind(event.actor_id.as_deref())
            .bind(&event.compressed_payload)
            .bind(event.original_size_bytes)
            .bind(event.compressed_size_bytes)
            .bind(&event.payload_checksum)
            .bind(event.original_timestamp)
            .bind(event.archived_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }
        tx.commit().await.map_err(storage_error)
    }

    #[instrument(skip(self, rollup), fields(character_id = %rollup.character_id, event_count = rollup.event_count))]
    async fn save_rollup(&self, rollup: &EventRollup) -> Result<(), DomainError> {
        sqlx::query(&format!(
            "INSERT INTO event_rollups ({ROLLUP_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(rollup.id)
        .bind(rollup.character_id)
        .bind(&rollup.event_type)
        .bind(rollup.event_count)
        .bind(rollup.start_timestamp)
        .bind(rollup.end_timestamp)
        .bind(&rollup.aggregated_payload)
        .bind(&rollup.original_event_ids)
        .bind(rollup.space_saved_bytes)
        .bind(rollup.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn load_compressed(
        &self,
        character_id: Uuid,
    ) -> Result<Vec<CompressedEvent>, DomainError> {
        let rows = sqlx::query_as::<_, CompressedRow>(&format!(
            "SELECT {COMPRESSED_COLUMNS} FROM compressed_events \
             WHERE character_id = $1 ORDER BY sequence_number"
        ))
        .bind(character_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(CompressedEvent::from).collect())
    }

    async fn load_rollups(&self, character_id: Uuid) -> Result<Vec<EventRollup>, DomainError> {
        let rows = sqlx::query_as::<_, RollupRow>(&format!(
            "SELECT {ROLLUP_COLUMNS} FROM event_rollups \
             WHERE character_id = $1 ORDER BY start_timestamp"
        ))
        .bind(character_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(EventRollup::from).collect())
    }

    async fn archived_event_ids(&self, character_id: Uuid) -> Result<HashSet<Uuid>, DomainError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT original_event_id FROM compressed_events WHERE character_id = $1 \
             UNION \
             SELECT UNNEST(original_event_ids) FROM event_rollups WHERE character_id = $1",
        )
        .bind(character_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(ids.into_iter().collect())
    }

    async fn totals(&self) -> Result<ArchiveTotals, DomainError> {
        let (compressed_events, original_bytes, compressed_bytes): (i64, i64, i64) =
            sqlx::query_as(
                "SELECT COUNT(*)::BIGINT, \
                        COALESCE(SUM(original_size_bytes), 0)::BIGINT, \
                        COALESCE(SUM(compressed_size_bytes), 0)::BIGINT \
                 FROM compressed_events",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        let (rollups, rolled_up_events, saved_bytes): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*)::BIGINT, \
                    COALESCE(SUM(event_count), 0)::BIGINT, \
                    COALESCE(SUM(space_saved_bytes), 0)::BIGINT \
             FROM event_rollups",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(ArchiveTotals {
            compressed_events: to_u64(compressed_events),
            compressed_original_bytes: to_u64(original_bytes),
            compressed_bytes: to_u64(compressed_bytes),
            rollups: to_u64(rollups),
            rolled_up_events: to_u64(rolled_up_events),
            rollup_saved_bytes: to_u64(saved_bytes),
        })
    }
}
