use std::sync::Arc;

use async_trait::async_trait;
use questlog_core::aggregate::AggregateRoot;
use questlog_core::error::DomainError;
use questlog_core::repository::StoredEvent;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;
use uuid::Uuid;

use super::reconstructor::SnapshotReconstructor;
use super::scheduler::SnapshotScheduler;
use crate::dispatcher::EventDispatcher;
use crate::replay::commit_pending;
use crate::store::AggregateStore;

/// [`AggregateStore`] that reads through the snapshot strategy chain and
/// asks for a snapshot evaluation after every successful save.
///
/// The save returns as soon as the events are committed and dispatched;
/// the evaluation runs later on the snapshot worker.
pub struct SnapshotAwareRepository<A> {
    dispatcher: Arc<EventDispatcher>,
    reconstructor: SnapshotReconstructor<A>,
    scheduler: Option<SnapshotScheduler>,
}

impl<A> std::fmt::Debug for SnapshotAwareRepository<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotAwareRepository")
            .field("dispatcher", &self.dispatcher)
            .field("reconstructor", &self.reconstructor)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl<A: AggregateRoot + Serialize + DeserializeOwned> SnapshotAwareRepository<A> {
    /// `reconstructor` should read the same event log the dispatcher writes.
    #[must_use]
    pub fn new(
        dispatcher: Arc<EventDispatcher>,
        reconstructor: SnapshotReconstructor<A>,
        scheduler: Option<SnapshotScheduler>,
    ) -> Self {
        Self {
            dispatcher,
            reconstructor,
            scheduler,
        }
    }

    #[must_use]
    pub fn reconstructor(&self) -> &SnapshotReconstructor<A> {
        &self.reconstructor
    }
}

#[async_trait]
impl<A: AggregateRoot + Serialize + DeserializeOwned> AggregateStore<A>
    for SnapshotAwareRepository<A>
{
    async fn load(&self, aggregate_id: Uuid) -> Result<A, DomainError> {
        self.reconstructor.load(aggregate_id).await
    }

    #[instrument(skip(self, aggregate), fields(aggregate_id = %aggregate.aggregate_id()))]
    async fn save(
        &self,
        aggregate: &mut A,
        actor_id: Option<&str>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let committed = commit_pending(&self.dispatcher, aggregate, actor_id).await?;
        if let Some(scheduler) = self.scheduler.as_ref().filter(|_| !committed.is_empty()) {
            scheduler.request(aggregate.aggregate_id());
        }
        Ok(committed)
    }
}
