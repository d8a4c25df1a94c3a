//! Event dispatcher: append first, then notify handlers.

use std::collections::HashMap;
use std::sync::Arc;

use questlog_core::error::DomainError;
use questlog_core::handler::EventHandler;
use questlog_core::repository::{EventRepository, StoredEvent};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Persists event batches and fans each committed event out to the handlers
/// subscribed to its type.
///
/// Handlers run after the append has committed, one at a time, in
/// registration order. A failing handler is logged and skipped; it can
/// neither undo the append nor stop the remaining handlers.
pub struct EventDispatcher {
    events: Arc<dyn EventRepository>,
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    wildcard: Vec<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("event_types", &self.handlers.keys().collect::<Vec<_>>())
            .field("wildcard_handlers", &self.wildcard.len())
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// Creates a dispatcher writing to `events` with no handlers.
    #[must_use]
    pub fn new(events: Arc<dyn EventRepository>) -> Self {
        Self {
            events,
            handlers: HashMap::new(),
            wildcard: Vec::new(),
        }
    }

    /// Subscribes `handler` to events of `event_type`.
    pub fn register(&mut self, event_type: &str, handler: Arc<dyn EventHandler>) {
        self.handlers
            .entry(event_type.to_owned())
            .or_default()
            .push(handler);
    }

    /// Subscribes `handler` to every event type.
    pub fn register_all(&mut self, handler: Arc<dyn EventHandler>) {
        self.wildcard.push(handler);
    }

    /// The event log this dispatcher appends to.
    #[must_use]
    pub fn event_repository(&self) -> &Arc<dyn EventRepository> {
        &self.events
    }

    /// Number of handlers an event of `event_type` would be delivered to.
    #[must_use]
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.get(event_type).map_or(0, Vec::len) + self.wildcard.len()
    }

    /// Appends `events` to the aggregate's stream and delivers them to the
    /// subscribed handlers.
    ///
    /// Events without an actor get `actor_id` stamped on them. Returns the
    /// events exactly as committed.
    ///
    /// The whole batch is appended before any handler runs, so a handler
    /// seeing the first event can already read the later ones from the log.
    ///
    /// # Errors
    ///
    /// Propagates append failures (`ConcurrencyConflict`, `Validation`,
    /// `StorageUnavailable`). Handler failures are never returned.
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub async fn dispatch(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        mut events: Vec<StoredEvent>,
        actor_id: Option<&str>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        if events.is_empty() {
            return Ok(events);
        }

        if let Some(actor) = actor_id {
            for event in events.iter_mut().filter(|e| e.actor_id.is_none()) {
                event.actor_id = Some(actor.to_owned());
            }
        }

        self.events
            .append_events(aggregate_id, expected_version, &events)
            .await?;
        debug!(%aggregate_id, expected_version, "events committed");

        for event in &events {
            self.notify(event).await;
        }
        Ok(events)
    }

    async fn notify(&self, event: &StoredEvent) {
        let typed = self
            .handlers
            .get(&event.event_type)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for handler in typed.iter().chain(&self.wildcard) {
            if let Err(error) = handler.handle(event).await {
                warn!(
                    handler = handler.name(),
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    %error,
                    "event handler failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use async_trait::async_trait;
    use questlog_event_store::InMemoryEventRepository;
    use questlog_test_support::{
        FailingEventHandler, FailingEventRepository, RecordingEventHandler,
        RecordingEventRepository, stored_event,
    };

    /// Records how long the stream was each time an event arrived.
    struct StreamLengthObserver {
        events: Arc<InMemoryEventRepository>,
        seen: Mutex<Vec<(i64, usize)>>,
    }

    #[async_trait]
    impl EventHandler for StreamLengthObserver {
        fn name(&self) -> &str {
            "stream-length"
        }

        async fn handle(&self, event: &StoredEvent) -> Result<(), DomainError> {
            let length = self.events.load_events(event.aggregate_id).await?.len();
            self.seen.lock().unwrap().push((event.sequence_number, length));
            Ok(())
        }
    }

    fn batch(aggregate_id: Uuid, from: i64, count: i64, event_type: &str) -> Vec<StoredEvent> {
        (from..from + count)
            .map(|n| stored_event(aggregate_id, n, event_type, serde_json::json!({"n": n})))
            .collect()
    }

    #[tokio::test]
    async fn test_dispatch_of_empty_batch_writes_nothing_and_notifies_nobody() {
        // Arrange
        let repo = Arc::new(RecordingEventRepository::new(vec![]));
        let handler = Arc::new(RecordingEventHandler::new("audit"));
        let mut dispatcher = EventDispatcher::new(repo.clone());
        dispatcher.register_all(handler.clone());

        // Act
        let committed = dispatcher
            .dispatch(Uuid::new_v4(), 0, vec![], Some("gm"))
            .await
            .unwrap();

        // Assert
        assert!(committed.is_empty());
        assert_eq!(repo.append_calls(), 0);
        assert!(handler.received().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_appends_whole_batch_in_one_call() {
        // Arrange
        let repo = Arc::new(RecordingEventRepository::new(vec![]));
        let dispatcher = EventDispatcher::new(repo.clone());
        let aggregate_id = Uuid::new_v4();

        // Act
        dispatcher
            .dispatch(aggregate_id, 2, batch(aggregate_id, 3, 3, "tally.incremented"), None)
            .await
            .unwrap();

        // Assert
        let appended = repo.appended_events();
        assert_eq!(appended.len(), 1);
        let (id, expected, events) = &appended[0];
        assert_eq!(*id, aggregate_id);
        assert_eq!(*expected, 2);
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_dispatch_stamps_actor_only_where_missing() {
        // Arrange
        let repo = Arc::new(RecordingEventRepository::new(vec![]));
        let dispatcher = EventDispatcher::new(repo.clone());
        let aggregate_id = Uuid::new_v4();
        let mut events = batch(aggregate_id, 1, 2, "tally.incremented");
        events[1].actor_id = Some("player-7".to_owned());

        // Act
        let committed = dispatcher
            .dispatch(aggregate_id, 0, events, Some("gm"))
            .await
            .unwrap();

        // Assert
        assert_eq!(committed[0].actor_id.as_deref(), Some("gm"));
        assert_eq!(committed[1].actor_id.as_deref(), Some("player-7"));
    }

    #[tokio::test]
    async fn test_handlers_receive_events_by_type_in_order() {
        // Arrange
        let repo = Arc::new(RecordingEventRepository::new(vec![]));
        let increments = Arc::new(RecordingEventHandler::new("increments"));
        let everything = Arc::new(RecordingEventHandler::new("everything"));
        let mut dispatcher = EventDispatcher::new(repo);
        dispatcher.register("tally.incremented", increments.clone());
        dispatcher.register_all(everything.clone());
        let aggregate_id = Uuid::new_v4();
        let mut events = batch(aggregate_id, 1, 1, "tally.opened");
        events.extend(batch(aggregate_id, 2, 2, "tally.incremented"));

        // Act
        dispatcher
            .dispatch(aggregate_id, 0, events, None)
            .await
            .unwrap();

        // Assert
        let typed: Vec<i64> = increments.received().iter().map(|e| e.sequence_number).collect();
        assert_eq!(typed, vec![2, 3]);
        let all: Vec<i64> = everything.received().iter().map(|e| e.sequence_number).collect();
        assert_eq!(all, vec![1, 2, 3]);
        assert_eq!(dispatcher.handler_count("tally.incremented"), 2);
        assert_eq!(dispatcher.handler_count("tally.opened"), 1);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_fail_dispatch_or_block_others() {
        // Arrange
        let repo = Arc::new(RecordingEventRepository::new(vec![]));
        let failing = Arc::new(FailingEventHandler::default());
        let recording = Arc::new(RecordingEventHandler::new("after"));
        let mut dispatcher = EventDispatcher::new(repo.clone());
        dispatcher.register_all(failing.clone());
        dispatcher.register_all(recording.clone());
        let aggregate_id = Uuid::new_v4();

        // Act
        let result = dispatcher
            .dispatch(aggregate_id, 0, batch(aggregate_id, 1, 2, "tally.incremented"), None)
            .await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(failing.attempts(), 2);
        assert_eq!(recording.received().len(), 2);
        assert_eq!(repo.append_calls(), 1);
    }

    #[tokio::test]
    async fn test_append_failure_propagates_and_skips_handlers() {
        // Arrange
        let handler = Arc::new(RecordingEventHandler::new("audit"));
        let mut dispatcher = EventDispatcher::new(Arc::new(FailingEventRepository));
        dispatcher.register_all(handler.clone());
        let aggregate_id = Uuid::new_v4();

        // Act
        let result = dispatcher
            .dispatch(aggregate_id, 0, batch(aggregate_id, 1, 1, "tally.opened"), None)
            .await;

        // Assert
        match result {
            Err(DomainError::StorageUnavailable(_)) => {}
            other => panic!("expected StorageUnavailable, got {other:?}"),
        }
        assert!(handler.received().is_empty());
    }

    #[tokio::test]
    async fn test_handlers_see_the_whole_batch_already_committed() {
        // Arrange
        let events = Arc::new(InMemoryEventRepository::new());
        let observer = Arc::new(StreamLengthObserver {
            events: events.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let mut dispatcher = EventDispatcher::new(events.clone());
        dispatcher.register_all(observer.clone());
        let aggregate_id = Uuid::new_v4();

        // Act
        dispatcher
            .dispatch(aggregate_id, 0, batch(aggregate_id, 1, 3, "tally.incremented"), None)
            .await
            .unwrap();

        // Assert
        let seen = observer.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }
}
