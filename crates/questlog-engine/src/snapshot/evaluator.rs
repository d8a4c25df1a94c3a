use std::sync::Arc;
use std::time::Instant;

use questlog_core::aggregate::AggregateRoot;
use questlog_core::clock::Clock;
use questlog_core::error::DomainError;
use questlog_core::snapshot::Snapshot;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::policy::SnapshotPolicy;
use super::reconstructor::SnapshotReconstructor;

/// Outcome of a snapshot evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotDecision {
    /// A new snapshot was published and is now the latest.
    Created(Snapshot),
    Skipped(SkipReason),
}

/// Why no snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No event follows the latest snapshot.
    UpToDate,
    /// Neither the event threshold nor the age limit was reached.
    BelowThreshold { events_since_snapshot: u64 },
}

/// Decides whether a character needs a fresh snapshot and takes it.
///
/// This is the only code path that creates snapshots.
pub struct SnapshotEvaluator<A> {
    reconstructor: SnapshotReconstructor<A>,
    clock: Arc<dyn Clock>,
    policy: SnapshotPolicy,
}

impl<A> std::fmt::Debug for SnapshotEvaluator<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotEvaluator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<A: AggregateRoot + Serialize + DeserializeOwned> SnapshotEvaluator<A> {
    #[must_use]
    pub fn new(
        reconstructor: SnapshotReconstructor<A>,
        clock: Arc<dyn Clock>,
        policy: SnapshotPolicy,
    ) -> Self {
        Self {
            reconstructor,
            clock,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &SnapshotPolicy {
        &self.policy
    }

    /// Counts the events recorded since the latest snapshot (or since
    /// creation) and checks the snapshot's age. When either limit is reached
    /// and there is something new to capture, rebuilds the current state and
    /// publishes it as the latest snapshot.
    ///
    /// # Errors
    ///
    /// Propagates storage failures and reconstruction errors. Nothing is
    /// published when an error is returned.
    #[instrument(skip(self))]
    pub async fn evaluate_snapshot_need(
        &self,
        character_id: Uuid,
    ) -> Result<SnapshotDecision, DomainError> {
        let snapshots = self.reconstructor.snapshot_repository();
        let latest = snapshots.get_latest(character_id).await?;
        let since = latest.as_ref().map_or(0, |s| s.event_version);

        let pending = self
            .reconstructor
            .event_repository()
            .load_events_since(character_id, since)
            .await?;
        let events_since_snapshot = pending.len() as u64;
        if events_since_snapshot == 0 {
            debug!("no events since latest snapshot");
            return Ok(SnapshotDecision::Skipped(SkipReason::UpToDate));
        }

        let count_reached = events_since_snapshot >= self.policy.event_threshold;
        let now = self.clock.now();
        let age_reached = latest
            .as_ref()
            .zip(self.policy.max_age)
            .is_some_and(|(snapshot, max_age)| now - snapshot.created_at >= max_age);
        if !count_reached && !age_reached {
            debug!(events_since_snapshot, "snapshot not needed yet");
            return Ok(SnapshotDecision::Skipped(SkipReason::BelowThreshold {
                events_since_snapshot,
            }));
        }

        let started = Instant::now();
        let reconstruction = self.reconstructor.load_with_report(character_id).await?;
        let serialized_state = serde_json::to_string(&reconstruction.aggregate)?;
        let creation_duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        let event_version = reconstruction.aggregate.version();
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            character_id,
            event_version,
            total_event_count: event_version,
            state_size_bytes: i64::try_from(serialized_state.len()).unwrap_or(i64::MAX),
            serialized_state,
            created_at: now,
            is_latest: true,
            creation_duration_ms,
        };
        snapshots.publish(&snapshot).await?;

        info!(
            event_version,
            events_since_snapshot,
            count_reached,
            age_reached,
            state_size_bytes = snapshot.state_size_bytes,
            "snapshot created"
        );
        Ok(SnapshotDecision::Created(snapshot))
    }
}
