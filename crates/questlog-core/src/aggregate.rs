//! Aggregate root abstraction.

use uuid::Uuid;

use crate::event::DomainEvent;

/// Trait for aggregate roots that reconstitute from event history.
pub trait AggregateRoot: Send + Sync + Sized + 'static {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the zero-value aggregate that the first event is folded into.
    fn new(id: Uuid) -> Self;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the current version (sequence number of the last event applied).
    fn version(&self) -> i64;

    /// Moves the version forward without changing state. Used when replay
    /// skips an event type it does not recognize.
    fn set_version(&mut self, version: i64);

    /// Apply an event to mutate internal state (used during reconstitution).
    fn apply(&mut self, event: &Self::Event);

    /// Returns uncommitted events produced by command handling.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Removes and returns uncommitted events after persistence.
    fn take_uncommitted_events(&mut self) -> Vec<Self::Event>;

    /// Clears uncommitted events after persistence.
    fn clear_uncommitted_events(&mut self) {
        self.take_uncommitted_events();
    }
}
