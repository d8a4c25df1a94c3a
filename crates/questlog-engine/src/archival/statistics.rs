//! Storage footprint reporting for capacity planning.

use chrono::{DateTime, Utc};
use questlog_core::archive::ArchiveTotals;
use questlog_core::repository::EventLogTotals;
use serde::Serialize;

/// Derived view over the live log and the archive. Recomputed on demand;
/// never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventStorageStatistics {
    /// Events still in the live log.
    pub live_events: u64,
    /// JSON payload bytes of the live events.
    pub live_payload_bytes: u64,
    /// Characters with at least one live event.
    pub characters: u64,
    /// Events stored in compressed form.
    pub compressed_events: u64,
    /// Payload bytes of those events before compression.
    pub compressed_original_bytes: u64,
    /// Payload bytes of those events after compression.
    pub compressed_bytes: u64,
    /// Compressed size over original size, `0.0` when nothing is compressed.
    pub compression_ratio: f64,
    /// Rollup records.
    pub rollups: u64,
    /// Events summarized by those rollups.
    pub rolled_up_events: u64,
    /// Bytes saved by rollups.
    pub rollup_saved_bytes: u64,
    /// Bytes saved by compression plus bytes saved by rollups.
    pub total_space_saved_bytes: u64,
    /// Live events per day between the oldest and newest live event,
    /// counting any span shorter than a day as one day.
    pub events_per_day: f64,
    /// Timestamp of the oldest live event.
    pub first_event_at: Option<DateTime<Utc>>,
    /// Timestamp of the newest live event.
    pub last_event_at: Option<DateTime<Utc>>,
}

impl EventStorageStatistics {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(live: &EventLogTotals, archive: &ArchiveTotals) -> Self {
        let compression_ratio = if archive.compressed_original_bytes == 0 {
            0.0
        } else {
            archive.compressed_bytes as f64 / archive.compressed_original_bytes as f64
        };

        let events_per_day = match (live.first_event_at, live.last_event_at) {
            (Some(first), Some(last)) if live.event_count > 0 => {
                let days = ((last - first).num_seconds() as f64 / 86_400.0).max(1.0);
                live.event_count as f64 / days
            }
            _ => 0.0,
        };

        let compression_saved = archive
            .compressed_original_bytes
            .saturating_sub(archive.compressed_bytes);

        Self {
            live_events: live.event_count,
            live_payload_bytes: live.payload_bytes,
            characters: live.aggregate_count,
            compressed_events: archive.compressed_events,
            compressed_original_bytes: archive.compressed_original_bytes,
            compressed_bytes: archive.compressed_bytes,
            compression_ratio,
            rollups: archive.rollups,
            rolled_up_events: archive.rolled_up_events,
            rollup_saved_bytes: archive.rollup_saved_bytes,
            total_space_saved_bytes: compression_saved + archive.rollup_saved_bytes,
            events_per_day,
            first_event_at: live.first_event_at,
            last_event_at: live.last_event_at,
        }
    }
}
