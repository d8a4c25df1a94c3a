//! Event handler abstraction.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::repository::StoredEvent;

/// A subscriber that reacts to dispatched events with side effects
/// (notifications, statistics).
///
/// Delivery is at-least-once at best: after a crash between the append and
/// dispatch a handler may never see an event, and a retried save may deliver
/// it again. Implementations must tolerate both.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs when the handler fails.
    fn name(&self) -> &str;

    /// Handles one event. Errors are logged by the dispatcher and never
    /// propagate to the writer.
    async fn handle(&self, event: &StoredEvent) -> Result<(), DomainError>;
}
