//! Full-replay reconstruction.
//!
//! Folds an aggregate's entire event stream, oldest first, into a fresh
//! instance. This is the reference read path: every other way of loading an
//! aggregate must produce the same state.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use questlog_core::aggregate::AggregateRoot;
use questlog_core::error::DomainError;
use questlog_core::event::DomainEvent;
use questlog_core::repository::StoredEvent;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::dispatcher::EventDispatcher;
use crate::store::AggregateStore;

/// Rebuilds an aggregate from its complete event stream.
///
/// # Errors
///
/// Returns `AggregateNotFound` for an empty stream and `CorruptAggregate`
/// when the first event is not a creation event, when the stream has a
/// version gap, or when a known event has an undecodable payload.
pub fn replay<A: AggregateRoot>(
    aggregate_id: Uuid,
    events: &[StoredEvent],
) -> Result<A, DomainError> {
    let Some(first) = events.first() else {
        return Err(DomainError::AggregateNotFound(aggregate_id));
    };

    let creation = decode::<A>(aggregate_id, first)?;
    if !creation.as_ref().is_some_and(|event| event.is_creation()) {
        return Err(DomainError::CorruptAggregate {
            aggregate_id,
            reason: format!(
                "stream starts with {} at version {}, not a creation event",
                first.event_type, first.sequence_number
            ),
        });
    }

    let mut aggregate = A::new(aggregate_id);
    replay_onto(&mut aggregate, events)?;
    Ok(aggregate)
}

/// Folds `events` onto an existing aggregate, typically one restored from a
/// snapshot.
///
/// Each event must carry the version right after the aggregate's current
/// one. Event types the aggregate does not know are skipped with a warning
/// but still advance the version.
///
/// # Errors
///
/// Returns `CorruptAggregate` on a version gap or an undecodable payload.
pub fn replay_onto<A: AggregateRoot>(
    aggregate: &mut A,
    events: &[StoredEvent],
) -> Result<(), DomainError> {
    let aggregate_id = aggregate.aggregate_id();
    for stored in events {
        let expected = aggregate.version() + 1;
        if stored.aggregate_id != aggregate_id || stored.sequence_number != expected {
            return Err(DomainError::CorruptAggregate {
                aggregate_id,
                reason: format!(
                    "expected version {expected}, found {} of aggregate {}",
                    stored.sequence_number, stored.aggregate_id
                ),
            });
        }

        match decode::<A>(aggregate_id, stored)? {
            Some(event) => aggregate.apply(&event),
            None => warn!(
                %aggregate_id,
                event_type = %stored.event_type,
                version = stored.sequence_number,
                "skipping unknown event type"
            ),
        }
        aggregate.set_version(stored.sequence_number);
    }
    Ok(())
}

fn decode<A: AggregateRoot>(
    aggregate_id: Uuid,
    stored: &StoredEvent,
) -> Result<Option<A::Event>, DomainError> {
    A::Event::from_stored(stored).map_err(|e| DomainError::CorruptAggregate {
        aggregate_id,
        reason: format!(
            "{} at version {} has an unreadable payload: {e}",
            stored.event_type, stored.sequence_number
        ),
    })
}

/// Dispatches an aggregate's pending events and folds them into it once
/// committed. Shared by every [`AggregateStore`] in this crate.
pub(crate) async fn commit_pending<A: AggregateRoot>(
    dispatcher: &EventDispatcher,
    aggregate: &mut A,
    actor_id: Option<&str>,
) -> Result<Vec<StoredEvent>, DomainError> {
    if aggregate.uncommitted_events().is_empty() {
        return Ok(Vec::new());
    }

    let stored: Vec<StoredEvent> = aggregate
        .uncommitted_events()
        .iter()
        .map(DomainEvent::to_stored_event)
        .collect();
    let committed = dispatcher
        .dispatch(aggregate.aggregate_id(), aggregate.version(), stored, actor_id)
        .await?;

    for event in aggregate.take_uncommitted_events() {
        aggregate.apply(&event);
        aggregate.set_version(event.metadata().sequence_number);
    }
    Ok(committed)
}

/// [`AggregateStore`] that always folds the full stream.
pub struct ReplayRepository<A> {
    dispatcher: Arc<EventDispatcher>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> std::fmt::Debug for ReplayRepository<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayRepository")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl<A: AggregateRoot> ReplayRepository<A> {
    /// Creates a repository that reads through the dispatcher's event log.
    #[must_use]
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            dispatcher,
            _aggregate: PhantomData,
        }
    }
}

#[async_trait]
impl<A: AggregateRoot> AggregateStore<A> for ReplayRepository<A> {
    #[instrument(skip(self))]
    async fn load(&self, aggregate_id: Uuid) -> Result<A, DomainError> {
        let events = self
            .dispatcher
            .event_repository()
            .load_events(aggregate_id)
            .await?;
        replay(aggregate_id, &events)
    }

    async fn save(
        &self,
        aggregate: &mut A,
        actor_id: Option<&str>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        commit_pending(&self.dispatcher, aggregate, actor_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questlog_event_store::InMemoryEventRepository;
    use questlog_test_support::{
        RecordingEventRepository, TALLY_INCREMENTED, TALLY_OPENED, Tally, stored_event,
    };
    use serde_json::json;

    fn opened(id: Uuid) -> StoredEvent {
        stored_event(id, 1, TALLY_OPENED, json!({"Opened": {"label": "gold"}}))
    }

    fn incremented(id: Uuid, version: i64, by: i64) -> StoredEvent {
        stored_event(id, version, TALLY_INCREMENTED, json!({"Incremented": {"by": by}}))
    }

    #[test]
    fn test_replay_folds_events_in_order() {
        // Arrange
        let id = Uuid::new_v4();
        let events = vec![opened(id), incremented(id, 2, 5), incremented(id, 3, 7)];

        // Act
        let tally: Tally = replay(id, &events).unwrap();

        // Assert
        assert_eq!(tally.label.as_deref(), Some("gold"));
        assert_eq!(tally.total, 12);
        assert_eq!(tally.version, 3);
    }

    #[test]
    fn test_replay_of_empty_stream_is_not_found() {
        let id = Uuid::new_v4();

        match replay::<Tally>(id, &[]) {
            Err(DomainError::AggregateNotFound(missing)) => assert_eq!(missing, id),
            other => panic!("expected AggregateNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_replay_without_creation_event_is_corrupt() {
        let id = Uuid::new_v4();
        match replay::<Tally>(id, &[incremented(id, 1, 5)]) {
            Err(DomainError::CorruptAggregate { aggregate_id, .. }) => assert_eq!(aggregate_id, id),
            other => panic!("expected CorruptAggregate, got {other:?}"),
        }
    }

    #[test]
    fn test_replay_skips_unknown_types_but_advances_version() {
        // Arrange
        let id = Uuid::new_v4();
        let events = vec![
            opened(id),
            stored_event(id, 2, "tally.renamed", json!({"Renamed": {"label": "silver"}})),
            incremented(id, 3, 4),
        ];

        // Act
        let tally: Tally = replay(id, &events).unwrap();

        // Assert
        assert_eq!(tally.label.as_deref(), Some("gold"));
        assert_eq!(tally.total, 4);
        assert_eq!(tally.version, 3);
    }

    #[test]
    fn test_replay_rejects_undecodable_payload() {
        let id = Uuid::new_v4();
        let events = vec![
            opened(id),
            stored_event(id, 2, TALLY_INCREMENTED, json!({"Incremented": {"by": "lots"}})),
        ];

        assert!(matches!(
            replay::<Tally>(id, &events),
            Err(DomainError::CorruptAggregate { .. })
        ));
    }

    #[test]
    fn test_replay_onto_rejects_version_gap() {
        // Arrange
        let id = Uuid::new_v4();
        let mut tally: Tally = replay(id, &[opened(id)]).unwrap();

        // Act
        let result = replay_onto(&mut tally, &[incremented(id, 3, 1)]);

        // Assert
        match result {
            Err(DomainError::CorruptAggregate { reason, .. }) => {
                assert!(reason.contains("expected version 2"), "{reason}");
            }
            other => panic!("expected CorruptAggregate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_save_with_nothing_pending_writes_nothing() {
        // Arrange
        let id = Uuid::new_v4();
        let log = Arc::new(RecordingEventRepository::new(vec![opened(id)]));
        let repo = ReplayRepository::<Tally>::new(Arc::new(EventDispatcher::new(log.clone())));
        let mut tally = repo.load(id).await.unwrap();

        // Act
        let committed = repo.save(&mut tally, Some("gm")).await.unwrap();

        // Assert
        assert!(committed.is_empty());
        assert_eq!(log.append_calls(), 0);
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips_state() {
        // Arrange
        let log = Arc::new(InMemoryEventRepository::new());
        let repo = ReplayRepository::<Tally>::new(Arc::new(EventDispatcher::new(log)));
        let id = Uuid::new_v4();
        let mut tally = Tally::new(id);
        tally.open("xp");
        tally.increment(10);
        tally.increment(15);

        // Act
        let committed = repo.save(&mut tally, Some("gm")).await.unwrap();
        let loaded = repo.load(id).await.unwrap();

        // Assert
        assert_eq!(committed.len(), 3);
        assert!(tally.uncommitted_events().is_empty());
        assert_eq!(tally.version, 3);
        assert_eq!(loaded, tally);
        assert_eq!(loaded.total, 25);
    }

    #[tokio::test]
    async fn test_stale_save_is_a_conflict_and_keeps_pending_events() {
        // Arrange
        let log = Arc::new(InMemoryEventRepository::new());
        let repo = ReplayRepository::<Tally>::new(Arc::new(EventDispatcher::new(log)));
        let id = Uuid::new_v4();
        let mut tally = Tally::new(id);
        tally.open("xp");
        repo.save(&mut tally, None).await.unwrap();
        let mut first = repo.load(id).await.unwrap();
        let mut second = repo.load(id).await.unwrap();
        first.increment(1);
        second.increment(2);
        repo.save(&mut first, None).await.unwrap();

        // Act
        let result = repo.save(&mut second, None).await;

        // Assert
        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict { expected: 1, actual: 2, .. })
        ));
        assert_eq!(second.uncommitted_events().len(), 1);
        assert_eq!(repo.load(id).await.unwrap().total, 1);
    }
}
