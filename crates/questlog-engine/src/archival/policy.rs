use chrono::Duration;

/// What the compactor archives and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivalPolicy {
    /// Events older than this are eligible.
    pub retention: Duration,
    /// Width of the time buckets rollups are computed over.
    pub rollup_window: Duration,
    /// Event types summarized by rollup. Everything else is compressed.
    pub rollup_event_types: Vec<String>,
    /// Buckets with fewer events are compressed instead.
    pub min_rollup_size: usize,
    /// Maximum number of events scanned per run.
    pub batch_size: usize,
    /// Remove archived events from the live log once they are covered by
    /// the latest snapshot.
    pub purge_originals: bool,
}

impl Default for ArchivalPolicy {
    fn default() -> Self {
        Self {
            retention: Duration::days(90),
            rollup_window: Duration::hours(1),
            rollup_event_types: Vec::new(),
            min_rollup_size: 10,
            batch_size: 1_000,
            purge_originals: false,
        }
    }
}

impl ArchivalPolicy {
    #[must_use]
    pub fn is_rollup_type(&self, event_type: &str) -> bool {
        self.rollup_event_types.iter().any(|t| t == event_type)
    }
}
