//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use questlog_core::error::DomainError;
use questlog_core::repository::{
    EventLogTotals, EventRepository, ScanCursor, StoredEvent, check_contiguous,
};

use crate::error::{is_unique_violation, storage_error, to_u64};

const EVENT_COLUMNS: &str = "event_id, aggregate_id, event_type, payload, sequence_number, \
     correlation_id, causation_id, actor_id, occurred_at";

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    event_id: Uuid,
    aggregate_id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    sequence_number: i64,
    correlation_id: Uuid,
    causation_id: Uuid,
    actor_id: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.event_id,
            aggregate_id: row.aggregate_id,
            event_type: row.event_type,
            payload: row.payload,
            sequence_number: row.sequence_number,
            correlation_id: row.correlation_id,
            causation_id: row.causation_id,
            actor_id: row.actor_id,
            occurred_at: row.occurred_at,
        }
    }
}

/// PostgreSQL-backed event repository.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn head_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(sequence_number), 0)::BIGINT FROM domain_events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    #[instrument(skip(self))]
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        self.load_events_since(aggregate_id, 0).await
    }

    #[instrument(skip(self))]
    async fn load_events_since(
        &self,
        aggregate_id: Uuid,
        from_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM domain_events \
             WHERE aggregate_id = $1 AND sequence_number > $2 \
             ORDER BY sequence_number"
        ))
        .bind(aggregate_id)
        .bind(from_version)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }
        check_contiguous(aggregate_id, expected_version, events)?;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let actual: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_number), 0)::BIGINT FROM domain_events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_error)?;

        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        for event in events {
            let inserted = sqlx::query(&format!(
                "INSERT INTO domain_events ({EVENT_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
            ))
            .bind(event.event_id)
            .bind(event.aggregate_id)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.sequence_number)
            .bind(event.correlation_id)
            .bind(event.causation_id)
            .bind(event.actor_id.as_deref())
            .bind(event.occurred_at)
            .execute(&mut *tx)
            .await;

            if let Err(err) = inserted {
                if is_unique_violation(&err) {
                    // A concurrent writer committed first; the transaction
                    // rolls back on drop.
                    drop(tx);
                    let actual = self
                        .head_version(aggregate_id)
                        .await
                        .unwrap_or(expected_version + 1);
                    return Err(DomainError::ConcurrencyConflict {
                        aggregate_id,
                        expected: expected_version,
                        actual,
                    });
                }
                return Err(storage_error(err));
            }
        }

        tx.commit().await.map_err(storage_error)?;
        tracing::debug!(%aggregate_id, expected_version, "appended events");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_events_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<ScanCursor>,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM domain_events \
             WHERE occurred_at < $1 \
               AND ($2::timestamptz IS NULL \
                    OR (occurred_at, aggregate_id, sequence_number) > ($2, $3::uuid, $4::bigint)) \
             ORDER BY occurred_at, aggregate_id, sequence_number \
             LIMIT $5"
        ))
        .bind(cutoff)
        .bind(after.map(|c| c.occurred_at))
        .bind(after.map(|c| c.aggregate_id))
        .bind(after.map(|c| c.sequence_number))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    #[instrument(skip(self, event_ids), fields(count = event_ids.len()))]
    async fn remove_events(
        &self,
        aggregate_id: Uuid,
        event_ids: &[Uuid],
    ) -> Result<u64, DomainError> {
        if event_ids.is_empty() {
            return Ok(0);
        }
        let result =
            sqlx::query("DELETE FROM domain_events WHERE aggregate_id = $1 AND event_id = ANY($2)")
                .bind(aggregate_id)
                .bind(event_ids.to_vec())
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
        Ok(result.rows_affected())
    }

    async fn totals(&self) -> Result<EventLogTotals, DomainError> {
        let (event_count, payload_bytes, aggregate_count, first_event_at, last_event_at): (
            i64,
            i64,
            i64,
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as(
            "SELECT COUNT(*)::BIGINT, \
                    COALESCE(SUM(octet_length(payload::text)), 0)::BIGINT, \
                    COUNT(DISTINCT aggregate_id)::BIGINT, \
                    MIN(occurred_at), \
                    MAX(occurred_at) \
             FROM domain_events",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(EventLogTotals {
            event_count: to_u64(event_count),
            payload_bytes: to_u64(payload_bytes),
            aggregate_count: to_u64(aggregate_count),
            first_event_at,
            last_event_at,
        })
    }
}
