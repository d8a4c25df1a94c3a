//! Snapshot-aware reads and background snapshot creation.
//!
//! Reads go through [`SnapshotReconstructor`], an ordered chain of load
//! strategies that falls back to full replay whenever the snapshot path
//! fails. Writes go through [`SnapshotAwareRepository`], which commits
//! synchronously and then queues a [`SnapshotEvaluator`] run on the
//! [`SnapshotWorker`].

mod evaluator;
mod policy;
mod reconstructor;
mod repository;
mod scheduler;

pub use evaluator::{SkipReason, SnapshotDecision, SnapshotEvaluator};
pub use policy::SnapshotPolicy;
pub use reconstructor::{LoadStrategy, Reconstruction, SnapshotReconstructor};
pub use repository::SnapshotAwareRepository;
pub use scheduler::{SnapshotQueue, SnapshotScheduler, SnapshotWorker, WorkerReport, snapshot_queue};
