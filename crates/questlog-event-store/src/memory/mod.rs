//! In-process backends.
//!
//! Each store guards its state with a single `tokio::sync::RwLock`; every
//! multi-row write happens inside one write-lock scope, which gives the same
//! all-or-nothing behavior as a database transaction, including when the
//! calling future is dropped mid-operation.

mod archive;
mod events;
mod snapshots;

pub use archive::InMemoryArchiveRepository;
pub use events::InMemoryEventRepository;
pub use snapshots::InMemorySnapshotRepository;
