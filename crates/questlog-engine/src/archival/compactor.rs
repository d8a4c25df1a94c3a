use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use questlog_core::archive::{ArchiveRepository, CompressedEvent};
use questlog_core::clock::Clock;
use questlog_core::error::DomainError;
use questlog_core::repository::{EventRepository, ScanCursor, StoredEvent};
use questlog_core::snapshot::SnapshotRepository;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::compression::{compress_event, restore};
use super::policy::ArchivalPolicy;
use super::rollup::{bucket_events, build_rollup};
use super::statistics::EventStorageStatistics;

/// What one compaction run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    /// Events older than this were eligible.
    pub cutoff: DateTime<Utc>,
    /// Eligible events examined, archived or not.
    pub scanned: u64,
    /// Distinct characters among the examined events.
    pub characters: u64,
    /// Eligible events that an earlier run had already archived.
    pub already_archived: u64,
    /// Events compressed in this run.
    pub compressed: u64,
    /// Rollups written in this run.
    pub rollups_created: u64,
    /// Events summarized by those rollups.
    pub rolled_up_events: u64,
    /// Bytes saved by this run's compression and rollups.
    pub bytes_saved: u64,
    /// Events removed from the live log.
    pub purged: u64,
}

/// Moves events older than the retention window into the archive.
///
/// For every character the compacted records are written and verified
/// before anything is removed from the live log, and removal only happens
/// when [`ArchivalPolicy::purge_originals`] is set. Events already
/// referenced by an archive record are skipped, so reruns are harmless.
pub struct ArchivalCompactor {
    events: Arc<dyn EventRepository>,
    archive: Arc<dyn ArchiveRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    clock: Arc<dyn Clock>,
    policy: ArchivalPolicy,
}

impl std::fmt::Debug for ArchivalCompactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivalCompactor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ArchivalCompactor {
    #[must_use]
    pub fn new(
        events: Arc<dyn EventRepository>,
        archive: Arc<dyn ArchiveRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        clock: Arc<dyn Clock>,
        policy: ArchivalPolicy,
    ) -> Self {
        Self {
            events,
            archive,
            snapshots,
            clock,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &ArchivalPolicy {
        &self.policy
    }

    /// Runs one compaction pass that archives at most `batch_size` events.
    ///
    /// Eligible events are paged in [`ScanCursor`] order. Events an earlier
    /// run already archived are counted and passed over, so every run moves
    /// further through the log even while the originals are kept.
    ///
    /// # Errors
    ///
    /// Propagates storage failures and any compressed record that fails
    /// verification. Characters processed before the failure stay
    /// compacted.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<CompactionReport, DomainError> {
        let now = self.clock.now();
        let cutoff = now - self.policy.retention;
        let batch_size = self.policy.batch_size.max(1);

        let mut report = CompactionReport {
            cutoff,
            ..CompactionReport::default()
        };
        let mut archived: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        let mut by_character: BTreeMap<Uuid, Vec<StoredEvent>> = BTreeMap::new();
        let mut fresh = 0usize;
        let mut cursor = None;

        'scan: loop {
            let page = self
                .events
                .load_events_before(cutoff, cursor, batch_size)
                .await?;
            let exhausted = page.len() < batch_size;
            cursor = page.last().map(ScanCursor::at);

            for event in page {
                if !archived.contains_key(&event.aggregate_id) {
                    let ids = self.archive.archived_event_ids(event.aggregate_id).await?;
                    archived.insert(event.aggregate_id, ids);
                }
                let seen = archived
                    .get(&event.aggregate_id)
                    .is_some_and(|ids| ids.contains(&event.event_id));
                if !seen {
                    if fresh == batch_size {
                        break 'scan;
                    }
                    fresh += 1;
                }
                report.scanned += 1;
                by_character.entry(event.aggregate_id).or_default().push(event);
            }

            if exhausted || fresh == batch_size {
                break;
            }
        }

        let empty = HashSet::new();
        for (character_id, events) in &by_character {
            report.characters += 1;
            let archived = archived.get(character_id).unwrap_or(&empty);
            self.compact_character(*character_id, events, archived, now, &mut report)
                .await?;
        }

        info!(
            scanned = report.scanned,
            compressed = report.compressed,
            rollups = report.rollups_created,
            rolled_up_events = report.rolled_up_events,
            purged = report.purged,
            bytes_saved = report.bytes_saved,
            "compaction finished"
        );
        Ok(report)
    }

    async fn compact_character(
        &self,
        character_id: Uuid,
        events: &[StoredEvent],
        archived: &HashSet<Uuid>,
        now: DateTime<Utc>,
        report: &mut CompactionReport,
    ) -> Result<(), DomainError> {
        let fresh: Vec<&StoredEvent> = events
            .iter()
            .filter(|e| !archived.contains(&e.event_id))
            .collect();
        report.already_archived += (events.len() - fresh.len()) as u64;

        let (rollup_candidates, mut to_compress): (Vec<&StoredEvent>, Vec<&StoredEvent>) = fresh
            .into_iter()
            .partition(|e| self.policy.is_rollup_type(&e.event_type));

        let mut rollups = Vec::new();
        for bucket in bucket_events(rollup_candidates, self.policy.rollup_window) {
            if bucket.len() >= self.policy.min_rollup_size.max(1) {
                rollups.push(build_rollup(&bucket, now)?);
            } else {
                to_compress.extend(bucket);
            }
        }
        to_compress.sort_by_key(|e| e.sequence_number);

        let compressed = to_compress
            .iter()
            .map(|event| compress_verified(event, now))
            .collect::<Result<Vec<_>, _>>()?;

        self.archive.save_compressed(&compressed).await?;
        for rollup in &rollups {
            self.archive.save_rollup(rollup).await?;
        }

        let saved: i64 = compressed
            .iter()
            .map(CompressedEvent::space_saved_bytes)
            .chain(rollups.iter().map(|r| r.space_saved_bytes))
            .sum();
        report.compressed += compressed.len() as u64;
        report.rollups_created += rollups.len() as u64;
        report.rolled_up_events += rollups.iter().map(|r| r.original_event_ids().len() as u64).sum::<u64>();
        report.bytes_saved += u64::try_from(saved).unwrap_or(0);

        debug!(
            %character_id,
            compressed = compressed.len(),
            rollups = rollups.len(),
            "character compacted"
        );

        if self.policy.purge_originals {
            report.purged += self.purge(character_id, events).await?;
        }
        Ok(())
    }

    /// Removes compressed events that the latest snapshot already covers.
    /// The event at the snapshot's own version stays, so the live log keeps
    /// its head. Rolled-up events are never removed: a rollup cannot give
    /// them back, and full replay restores purged events from their
    /// compressed records.
    async fn purge(&self, character_id: Uuid, events: &[StoredEvent]) -> Result<u64, DomainError> {
        let snapshot = match self.snapshots.get_latest(character_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(%character_id, "no snapshot, keeping archived originals");
                return Ok(0);
            }
            Err(error) => {
                warn!(%character_id, %error, "snapshot store unavailable, skipping purge");
                return Ok(0);
            }
        };

        let restorable: HashSet<Uuid> = self
            .archive
            .load_compressed(character_id)
            .await?
            .iter()
            .map(|c| c.original_event_id)
            .collect();
        let removable: Vec<Uuid> = events
            .iter()
            .filter(|e| e.sequence_number < snapshot.event_version && restorable.contains(&e.event_id))
            .map(|e| e.event_id)
            .collect();
        if removable.is_empty() {
            return Ok(0);
        }

        let removed = self.events.remove_events(character_id, &removable).await?;
        info!(%character_id, removed, below_version = snapshot.event_version, "purged archived events");
        Ok(removed)
    }

    /// Current footprint of the live log and the archive.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn storage_statistics(&self) -> Result<EventStorageStatistics, DomainError> {
        let live = self.events.totals().await?;
        let archive = self.archive.totals().await?;
        Ok(EventStorageStatistics::compute(&live, &archive))
    }

    /// Deletes all but the newest `keep_count` snapshots per character.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn prune_snapshots(&self, keep_count: usize) -> Result<u64, DomainError> {
        let deleted = self.snapshots.prune(keep_count).await?;
        info!(keep_count, deleted, "pruned snapshots");
        Ok(deleted)
    }
}

/// Compresses `event` and checks that the record restores to the same event.
fn compress_verified(event: &StoredEvent, now: DateTime<Utc>) -> Result<CompressedEvent, DomainError> {
    let compressed = compress_event(event, now)?;
    if restore(&compressed)? != *event {
        return Err(DomainError::Serialization(format!(
            "compressed form of event {} does not restore",
            event.event_id
        )));
    }
    Ok(compressed)
}
