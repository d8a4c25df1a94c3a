use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use questlog_core::aggregate::AggregateRoot;

use super::evaluator::{SnapshotDecision, SnapshotEvaluator};

/// Creates a bounded evaluation queue. The scheduler side is cheap to clone
/// and is handed to repositories; the queue side is consumed by
/// [`SnapshotWorker::spawn`].
#[must_use]
pub fn snapshot_queue(capacity: usize) -> (SnapshotScheduler, SnapshotQueue) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (SnapshotScheduler { sender }, SnapshotQueue { receiver })
}

/// Requests snapshot evaluations without waiting for them.
#[derive(Debug, Clone)]
pub struct SnapshotScheduler {
    sender: mpsc::Sender<Uuid>,
}

impl SnapshotScheduler {
    /// Queues an evaluation for `character_id`.
    ///
    /// Returns `false` when the request was dropped because the queue is
    /// full or the worker has stopped. Dropping is safe: the next save of the
    /// same character queues a new request.
    pub fn request(&self, character_id: Uuid) -> bool {
        match self.sender.try_send(character_id) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%character_id, "snapshot queue full, dropping request");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(%character_id, "snapshot worker stopped, dropping request");
                false
            }
        }
    }

    /// Requests waiting to be evaluated.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

/// Receiving end of the evaluation queue.
#[derive(Debug)]
pub struct SnapshotQueue {
    receiver: mpsc::Receiver<Uuid>,
}

/// Counters reported by a stopped worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Evaluations attempted, failed ones included.
    pub evaluated: u64,
    /// Evaluations that published a snapshot.
    pub created: u64,
    /// Evaluations that returned an error.
    pub failed: u64,
}

/// Background task that runs queued snapshot evaluations one at a time.
#[derive(Debug)]
pub struct SnapshotWorker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<WorkerReport>,
}

impl SnapshotWorker {
    /// Starts consuming `queue` on the current tokio runtime.
    #[must_use]
    pub fn spawn<A>(evaluator: SnapshotEvaluator<A>, queue: SnapshotQueue) -> Self
    where
        A: AggregateRoot + Serialize + DeserializeOwned,
    {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(evaluator, queue.receiver, shutdown_rx));
        Self { shutdown, handle }
    }

    /// Stops accepting requests, evaluates everything already queued, and
    /// waits for the worker to finish.
    pub async fn shutdown(self) -> WorkerReport {
        let _ = self.shutdown.send(());
        match self.handle.await {
            Ok(report) => report,
            Err(join_error) => {
                error!(%join_error, "snapshot worker terminated abnormally");
                WorkerReport::default()
            }
        }
    }

    /// Stops immediately, abandoning the in-flight evaluation and anything
    /// still queued. Publishing is atomic, so an abandoned evaluation leaves
    /// no trace.
    pub fn abort(self) {
        self.handle.abort();
    }
}

async fn run<A>(
    evaluator: SnapshotEvaluator<A>,
    mut receiver: mpsc::Receiver<Uuid>,
    mut shutdown: oneshot::Receiver<()>,
) -> WorkerReport
where
    A: AggregateRoot + Serialize + DeserializeOwned,
{
    let mut report = WorkerReport::default();
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            next = receiver.recv() => match next {
                Some(character_id) => evaluate(&evaluator, character_id, &mut report).await,
                None => return report,
            },
        }
    }

    receiver.close();
    while let Some(character_id) = receiver.recv().await {
        evaluate(&evaluator, character_id, &mut report).await;
    }
    info!(
        evaluated = report.evaluated,
        created = report.created,
        failed = report.failed,
        "snapshot worker drained"
    );
    report
}

async fn evaluate<A>(evaluator: &SnapshotEvaluator<A>, character_id: Uuid, report: &mut WorkerReport)
where
    A: AggregateRoot + Serialize + DeserializeOwned,
{
    report.evaluated += 1;
    match evaluator.evaluate_snapshot_need(character_id).await {
        Ok(SnapshotDecision::Created(_)) => report.created += 1,
        Ok(SnapshotDecision::Skipped(_)) => {}
        Err(error) => {
            report.failed += 1;
            warn!(%character_id, %error, "snapshot evaluation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::snapshot::{SnapshotPolicy, SnapshotReconstructor};
    use questlog_core::clock::SystemClock;
    use questlog_core::event::DomainEvent;
    use questlog_core::repository::EventRepository;
    use questlog_core::snapshot::SnapshotRepository;
    use questlog_event_store::{InMemoryEventRepository, InMemorySnapshotRepository};
    use questlog_test_support::Tally;

    async fn seeded_tally(events: &InMemoryEventRepository, increments: usize) -> Uuid {
        let mut tally = Tally::new(Uuid::new_v4());
        tally.open("torches");
        for _ in 0..increments {
            tally.increment(1);
        }
        let stored: Vec<_> = tally
            .take_uncommitted_events()
            .iter()
            .map(DomainEvent::to_stored_event)
            .collect();
        events.append_events(tally.id, 0, &stored).await.unwrap();
        tally.id
    }

    fn evaluator(
        events: &Arc<InMemoryEventRepository>,
        snapshots: &Arc<InMemorySnapshotRepository>,
        threshold: u64,
    ) -> SnapshotEvaluator<Tally> {
        SnapshotEvaluator::new(
            SnapshotReconstructor::new(events.clone(), snapshots.clone()),
            Arc::new(SystemClock),
            SnapshotPolicy::with_event_threshold(threshold),
        )
    }

    #[tokio::test]
    async fn test_full_queue_drops_requests() {
        // Arrange
        let (scheduler, _queue) = snapshot_queue(2);

        // Act
        let accepted: Vec<bool> = (0..3).map(|_| scheduler.request(Uuid::new_v4())).collect();

        // Assert
        assert_eq!(accepted, vec![true, true, false]);
        assert_eq!(scheduler.queue_depth(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_requests() {
        // Arrange
        let events = Arc::new(InMemoryEventRepository::new());
        let snapshots = Arc::new(InMemorySnapshotRepository::new());
        let busy = seeded_tally(&events, 4).await;
        let quiet = seeded_tally(&events, 0).await;
        let (scheduler, queue) = snapshot_queue(8);
        assert!(scheduler.request(busy));
        assert!(scheduler.request(quiet));
        assert!(scheduler.request(Uuid::new_v4()));

        // Act
        let worker = SnapshotWorker::spawn(evaluator(&events, &snapshots, 3), queue);
        let report = worker.shutdown().await;

        // Assert
        assert_eq!(
            report,
            WorkerReport {
                evaluated: 3,
                created: 1,
                failed: 0,
            }
        );
        assert_eq!(scheduler.queue_depth(), 0);
        assert_eq!(
            snapshots.get_latest(busy).await.unwrap().map(|s| s.event_version),
            Some(5)
        );
        assert!(snapshots.get_latest(quiet).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_requests_after_shutdown_are_rejected() {
        // Arrange
        let events = Arc::new(InMemoryEventRepository::new());
        let snapshots = Arc::new(InMemorySnapshotRepository::new());
        let (scheduler, queue) = snapshot_queue(4);
        let worker = SnapshotWorker::spawn(evaluator(&events, &snapshots, 1), queue);

        // Act
        worker.shutdown().await;

        // Assert
        assert!(!scheduler.request(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_abort_stops_the_worker() {
        // Arrange
        let events = Arc::new(InMemoryEventRepository::new());
        let snapshots = Arc::new(InMemorySnapshotRepository::new());
        let (scheduler, queue) = snapshot_queue(128);
        let worker = SnapshotWorker::spawn(evaluator(&events, &snapshots, 1), queue);

        // Act
        worker.abort();
        tokio::task::yield_now().await;

        // Assert
        let mut rejected = false;
        for _ in 0..100 {
            if !scheduler.request(Uuid::new_v4()) {
                rejected = true;
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(rejected);
    }
}
