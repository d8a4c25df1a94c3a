use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use questlog_core::aggregate::AggregateRoot;
use questlog_core::archive::ArchiveRepository;
use questlog_core::error::DomainError;
use questlog_core::repository::{EventRepository, StoredEvent};
use questlog_core::snapshot::SnapshotRepository;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::archival::compression::restore;
use crate::replay::{replay, replay_onto};

/// One way of rebuilding an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Latest snapshot plus the events recorded after it.
    Snapshot,
    /// Every event from creation, including purged events restored from
    /// the archive.
    FullReplay,
}

/// A rebuilt aggregate and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction<A> {
    /// The rebuilt aggregate.
    pub aggregate: A,
    /// The strategy that produced it.
    pub strategy: LoadStrategy,
    /// Events folded on top of the starting state.
    pub events_replayed: usize,
}

/// Rebuilds aggregates by trying each [`LoadStrategy`] in order.
///
/// A strategy that fails is logged and the next one runs; only the error
/// of the last strategy reaches the caller. With the default chain
/// `[Snapshot, FullReplay]` a broken or unreachable snapshot store costs
/// a slower read and nothing else.
///
/// When the compactor purges originals, attach the archive with
/// [`Self::with_archive`] so full replay can still start from version 1.
pub struct SnapshotReconstructor<A> {
    events: Arc<dyn EventRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    archive: Option<Arc<dyn ArchiveRepository>>,
    strategies: Vec<LoadStrategy>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> Clone for SnapshotReconstructor<A> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
            snapshots: Arc::clone(&self.snapshots),
            archive: self.archive.clone(),
            strategies: self.strategies.clone(),
            _aggregate: PhantomData,
        }
    }
}

impl<A> std::fmt::Debug for SnapshotReconstructor<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotReconstructor")
            .field("strategies", &self.strategies)
            .field("archive", &self.archive.is_some())
            .finish_non_exhaustive()
    }
}

impl<A: AggregateRoot + DeserializeOwned> SnapshotReconstructor<A> {
    /// Creates a reconstructor with the `[Snapshot, FullReplay]` chain.
    #[must_use]
    pub fn new(events: Arc<dyn EventRepository>, snapshots: Arc<dyn SnapshotRepository>) -> Self {
        Self {
            events,
            snapshots,
            archive: None,
            strategies: vec![LoadStrategy::Snapshot, LoadStrategy::FullReplay],
            _aggregate: PhantomData,
        }
    }

    /// Replaces the strategy chain, e.g. `[FullReplay]` to bypass snapshots.
    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<LoadStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Lets full replay restore purged events from `archive`.
    #[must_use]
    pub fn with_archive(mut self, archive: Arc<dyn ArchiveRepository>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// The event log this reconstructor reads.
    #[must_use]
    pub fn event_repository(&self) -> &Arc<dyn EventRepository> {
        &self.events
    }

    /// The snapshot store this reconstructor reads.
    #[must_use]
    pub fn snapshot_repository(&self) -> &Arc<dyn SnapshotRepository> {
        &self.snapshots
    }

    /// Rebuilds the aggregate and reports which strategy succeeded.
    ///
    /// # Errors
    ///
    /// Returns the last strategy's error, or `AggregateNotFound` when no
    /// strategy produced an aggregate.
    #[instrument(skip(self))]
    pub async fn load_with_report(&self, aggregate_id: Uuid) -> Result<Reconstruction<A>, DomainError> {
        let mut last_error = None;
        for strategy in &self.strategies {
            match self.attempt(*strategy, aggregate_id).await {
                Ok(Some(reconstruction)) => {
                    debug!(
                        ?strategy,
                        events_replayed = reconstruction.events_replayed,
                        "aggregate reconstructed"
                    );
                    return Ok(reconstruction);
                }
                Ok(None) => debug!(?strategy, "strategy not applicable"),
                Err(error) => {
                    warn!(?strategy, %error, "load strategy failed, falling back");
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or(DomainError::AggregateNotFound(aggregate_id)))
    }

    /// Rebuilds the aggregate.
    ///
    /// # Errors
    ///
    /// See [`Self::load_with_report`].
    pub async fn load(&self, aggregate_id: Uuid) -> Result<A, DomainError> {
        Ok(self.load_with_report(aggregate_id).await?.aggregate)
    }

    async fn attempt(
        &self,
        strategy: LoadStrategy,
        aggregate_id: Uuid,
    ) -> Result<Option<Reconstruction<A>>, DomainError> {
        match strategy {
            LoadStrategy::Snapshot => self.load_from_snapshot(aggregate_id).await,
            LoadStrategy::FullReplay => {
                let events = self.full_history(aggregate_id).await?;
                let aggregate = replay(aggregate_id, &events)?;
                Ok(Some(Reconstruction {
                    aggregate,
                    strategy,
                    events_replayed: events.len(),
                }))
            }
        }
    }

    /// The live stream, with purged events restored from the archive when it
    /// no longer starts at version 1.
    async fn full_history(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let live = self.events.load_events(aggregate_id).await?;
        let complete = live.iter().zip(1..).all(|(e, v)| e.sequence_number == v);
        let Some(archive) = self.archive.as_ref().filter(|_| !complete) else {
            return Ok(live);
        };

        let mut by_version: BTreeMap<i64, StoredEvent> = BTreeMap::new();
        for compressed in archive.load_compressed(aggregate_id).await? {
            let event = restore(&compressed)?;
            by_version.insert(event.sequence_number, event);
        }
        let live_count = live.len();
        for event in live {
            by_version.insert(event.sequence_number, event);
        }
        debug!(
            live = live_count,
            total = by_version.len(),
            "merged archived events into the stream"
        );
        Ok(by_version.into_values().collect())
    }

    async fn load_from_snapshot(&self, aggregate_id: Uuid) -> Result<Option<Reconstruction<A>>, DomainError> {
        let Some(snapshot) = self.snapshots.get_latest(aggregate_id).await? else {
            return Ok(None);
        };

        let corrupt = |reason: String| DomainError::CorruptAggregate {
            aggregate_id,
            reason,
        };
        let mut aggregate: A = serde_json::from_str(&snapshot.serialized_state)
            .map_err(|e| corrupt(format!("snapshot {} is unreadable: {e}", snapshot.id)))?;
        if aggregate.aggregate_id() != aggregate_id || aggregate.version() != snapshot.event_version {
            return Err(corrupt(format!(
                "snapshot {} holds version {} of {}, recorded as version {}",
                snapshot.id,
                aggregate.version(),
                aggregate.aggregate_id(),
                snapshot.event_version
            )));
        }

        let tail = self
            .events
            .load_events_since(aggregate_id, snapshot.event_version)
            .await?;
        replay_onto(&mut aggregate, &tail)?;
        Ok(Some(Reconstruction {
            aggregate,
            strategy: LoadStrategy::Snapshot,
            events_replayed: tail.len(),
        }))
    }
}
