//! Test event handlers.

use std::sync::Mutex;

use async_trait::async_trait;
use questlog_core::error::DomainError;
use questlog_core::handler::EventHandler;
use questlog_core::repository::StoredEvent;

/// A handler that remembers every event it was given, in delivery order.
#[derive(Debug)]
pub struct RecordingEventHandler {
    name: String,
    received: Mutex<Vec<StoredEvent>>,
}

impl RecordingEventHandler {
    /// Creates a recording handler with the given log name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Returns every event received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn received(&self) -> Vec<StoredEvent> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for RecordingEventHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &StoredEvent) -> Result<(), DomainError> {
        self.received.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A handler that fails on every event and counts its attempts.
#[derive(Debug, Default)]
pub struct FailingEventHandler {
    attempts: Mutex<usize>,
}

impl FailingEventHandler {
    /// Number of events the handler was asked to handle.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl EventHandler for FailingEventHandler {
    fn name(&self) -> &str {
        "failing"
    }

    async fn handle(&self, _event: &StoredEvent) -> Result<(), DomainError> {
        *self.attempts.lock().unwrap() += 1;
        Err(DomainError::HandlerFailure {
            handler: "failing".into(),
            reason: "notification service unreachable".into(),
        })
    }
}
