//! Mock `EventRepository` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use questlog_core::error::DomainError;
use questlog_core::repository::{EventLogTotals, EventRepository, ScanCursor, StoredEvent};
use uuid::Uuid;

/// An event repository that records all `append_events` calls. Returns the
/// configured events from the load methods and always succeeds on
/// `append_events`.
#[derive(Debug)]
pub struct RecordingEventRepository {
    load_result: Mutex<Vec<StoredEvent>>,
    appended: Mutex<Vec<(Uuid, i64, Vec<StoredEvent>)>>,
}

impl RecordingEventRepository {
    /// Create a new recording repository that will return `load_result` from
    /// every load call.
    #[must_use]
    pub fn new(load_result: Vec<StoredEvent>) -> Self {
        Self {
            load_result: Mutex::new(load_result),
            appended: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of all events that were appended.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<(Uuid, i64, Vec<StoredEvent>)> {
        self.appended.lock().unwrap().clone()
    }

    /// Number of `append_events` calls, including empty ones.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn append_calls(&self) -> usize {
        self.appended.lock().unwrap().len()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.load_result.lock().unwrap().clone())
    }

    async fn load_events_since(
        &self,
        _aggregate_id: Uuid,
        from_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .load_result
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.sequence_number > from_version)
            .cloned()
            .collect())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        self.appended
            .lock()
            .unwrap()
            .push((aggregate_id, expected_version, events.to_vec()));
        Ok(())
    }

    async fn load_events_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<ScanCursor>,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .load_result
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.occurred_at < cutoff)
            .filter(|e| after.is_none_or(|cursor| ScanCursor::at(e) > cursor))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn remove_events(
        &self,
        _aggregate_id: Uuid,
        _event_ids: &[Uuid],
    ) -> Result<u64, DomainError> {
        Ok(0)
    }

    async fn totals(&self) -> Result<EventLogTotals, DomainError> {
        Ok(EventLogTotals::default())
    }
}

/// An event repository that always returns a storage error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventRepository;

fn refused() -> DomainError {
    DomainError::StorageUnavailable("connection refused".into())
}

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(refused())
    }

    async fn load_events_since(
        &self,
        _aggregate_id: Uuid,
        _from_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(refused())
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(refused())
    }

    async fn load_events_before(
        &self,
        _cutoff: DateTime<Utc>,
        _after: Option<ScanCursor>,
        _limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(refused())
    }

    async fn remove_events(
        &self,
        _aggregate_id: Uuid,
        _event_ids: &[Uuid],
    ) -> Result<u64, DomainError> {
        Err(refused())
    }

    async fn totals(&self) -> Result<EventLogTotals, DomainError> {
        Err(refused())
    }
}
