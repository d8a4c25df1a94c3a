//! `PostgreSQL` implementation of the `SnapshotRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use questlog_core::error::DomainError;
use questlog_core::snapshot::{Snapshot, SnapshotRepository, SnapshotStatistics};

use crate::error::{storage_error, to_u64};

const SNAPSHOT_COLUMNS: &str = "id, character_id, event_version, total_event_count, \
     serialized_state, created_at, is_latest, state_size_bytes, creation_duration_ms";

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    character_id: Uuid,
    event_version: i64,
    total_event_count: i64,
    serialized_state: String,
    created_at: DateTime<Utc>,
    is_latest: bool,
    state_size_bytes: i64,
    creation_duration_ms: i64,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            id: row.id,
            character_id: row.character_id,
            event_version: row.event_version,
            total_event_count: row.total_event_count,
            serialized_state: row.serialized_state,
            created_at: row.created_at,
            is_latest: row.is_latest,
            state_size_bytes: row.state_size_bytes,
            creation_duration_ms: row.creation_duration_ms,
        }
    }
}

/// PostgreSQL-backed snapshot repository.
#[derive(Debug, Clone)]
pub struct PgSnapshotRepository {
    pool: PgPool,
}

impl PgSnapshotRepository {
    /// Creates a new `PgSnapshotRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_snapshot<'e, E>(executor: E, snapshot: &Snapshot) -> Result<(), sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(&format!(
        "INSERT INTO character_snapshots ({SNAPSHOT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
    ))
    .bind(snapshot.id)
    .bind(snapshot.character_id)
    .bind(snapshot.event_version)
    .bind(snapshot.total_event_count)
    .bind(&snapshot.serialized_state)
    .bind(snapshot.created_at)
    .bind(snapshot.is_latest)
    .bind(snapshot.state_size_bytes)
    .bind(snapshot.creation_duration_ms)
    .execute(executor)
    .await?;
    Ok(())
}

async fn clear_latest<'e, E>(executor: E, character_id: Uuid) -> Result<(), sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        "UPDATE character_snapshots SET is_latest = FALSE \
         WHERE character_id = $1 AND is_latest",
    )
    .bind(character_id)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl SnapshotRepository for PgSnapshotRepository {
    #[instrument(skip(self))]
    async fn get_latest(&self, character_id: Uuid) -> Result<Option<Snapshot>, DomainError> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM character_snapshots \
             WHERE character_id = $1 AND is_latest"
        ))
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(Snapshot::from))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), DomainError> {
        insert_snapshot(&self.pool, snapshot)
            .await
            .map_err(storage_error)
    }

    async fn mark_previous_as_stale(&self, character_id: Uuid) -> Result<(), DomainError> {
        clear_latest(&self.pool, character_id)
            .await
            .map_err(storage_error)
    }

    #[instrument(skip(self, snapshot), fields(character_id = %snapshot.character_id, event_version = snapshot.event_version))]
    async fn publish(&self, snapshot: &Snapshot) -> Result<(), DomainError> {
        let mut latest = snapshot.clone();
        latest.is_latest = true;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        clear_latest(&mut *tx, snapshot.character_id)
            .await
            .map_err(storage_error)?;
        insert_snapshot(&mut *tx, &latest)
            .await
            .map_err(storage_error)?;
        tx.commit().await.map_err(storage_error)?;

        tracing::debug!("published snapshot");
        Ok(())
    }

    async fn list(&self, character_id: Uuid) -> Result<Vec<Snapshot>, DomainError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM character_snapshots \
             WHERE character_id = $1 \
             ORDER BY event_version DESC, created_at DESC"
        ))
        .bind(character_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(Snapshot::from).collect())
    }

    #[instrument(skip(self))]
    async fn prune(&self, keep_count: usize) -> Result<u64, DomainError> {
        let keep_count = i64::try_from(keep_count.max(1)).unwrap_or(i64::MAX);
        let result = sqlx::query(
            "WITH ranked AS ( \
                 SELECT id, is_latest, ROW_NUMBER() OVER ( \
                     PARTITION BY character_id \
                     ORDER BY event_version DESC, created_at DESC \
                 ) AS rank \
                 FROM character_snapshots \
             ) \
             DELETE FROM character_snapshots s \
             USING ranked r \
             WHERE s.id = r.id AND r.rank > $1 AND NOT r.is_latest",
        )
        .bind(keep_count)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected())
    }

    async fn statistics(&self) -> Result<SnapshotStatistics, DomainError> {
        #[allow(clippy::type_complexity)]
        let (total, latest, characters, total_bytes, avg_bytes, avg_ms, oldest, newest): (
            i64,
            i64,
            i64,
            i64,
            f64,
            f64,
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as(
            "SELECT COUNT(*)::BIGINT, \
                    COUNT(*) FILTER (WHERE is_latest)::BIGINT, \
                    COUNT(DISTINCT character_id)::BIGINT, \
                    COALESCE(SUM(state_size_bytes), 0)::BIGINT, \
                    COALESCE(AVG(state_size_bytes), 0)::FLOAT8, \
                    COALESCE(AVG(creation_duration_ms), 0)::FLOAT8, \
                    MIN(created_at), \
                    MAX(created_at) \
             FROM character_snapshots",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(SnapshotStatistics {
            total_snapshots: to_u64(total),
            latest_snapshots: to_u64(latest),
            characters_with_snapshots: to_u64(characters),
            total_state_bytes: to_u64(total_bytes),
            average_state_bytes: avg_bytes,
            average_creation_ms: avg_ms,
            oldest_snapshot_at: oldest,
            newest_snapshot_at: newest,
        })
    }
}
