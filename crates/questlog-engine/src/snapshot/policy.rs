use chrono::Duration;

/// When snapshots are taken and how many are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// Take a snapshot once this many events follow the latest one.
    pub event_threshold: u64,
    /// Take a snapshot once the latest one is this old, provided at least
    /// one event follows it. `None` disables the age check.
    pub max_age: Option<Duration>,
    /// Snapshots kept per character when pruning.
    pub keep_count: usize,
    /// Capacity of the evaluation queue.
    pub queue_capacity: usize,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            event_threshold: 100,
            max_age: Some(Duration::days(7)),
            keep_count: 5,
            queue_capacity: 256,
        }
    }
}

impl SnapshotPolicy {
    /// Policy with the given event threshold and defaults elsewhere.
    #[must_use]
    pub fn with_event_threshold(event_threshold: u64) -> Self {
        Self {
            event_threshold,
            ..Self::default()
        }
    }
}
