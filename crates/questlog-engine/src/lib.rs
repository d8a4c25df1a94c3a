//! Questlog event-sourcing engine.
//!
//! Builds the read and write paths on top of the storage contracts in
//! `questlog-core`: the dispatcher appends and fans events out to handlers,
//! the replay and snapshot repositories rebuild aggregates, and the archival
//! compactor moves old events into cold storage.

pub mod archival;
pub mod dispatcher;
pub mod replay;
pub mod snapshot;
pub mod store;

pub use dispatcher::EventDispatcher;
pub use replay::ReplayRepository;
pub use snapshot::{SnapshotAwareRepository, SnapshotReconstructor};
pub use store::AggregateStore;
