//! Event, snapshot and archive stores for Questlog.
//!
//! Two families of backends implement the `questlog-core` repository
//! traits:
//!
//! - [`memory`] keeps everything in process behind `tokio` locks. It enforces
//!   the same uniqueness and atomicity rules as the database and backs the
//!   unit tests of every other crate.
//! - The `pg_*` modules store everything in `PostgreSQL` via `sqlx`; the
//!   table layout lives in [`schema`] and in the workspace `migrations/`.

mod error;
pub mod memory;
pub mod pg_archive_repository;
pub mod pg_event_repository;
pub mod pg_snapshot_repository;
pub mod schema;

pub use memory::{InMemoryArchiveRepository, InMemoryEventRepository, InMemorySnapshotRepository};
pub use pg_archive_repository::PgArchiveRepository;
pub use pg_event_repository::PgEventRepository;
pub use pg_snapshot_repository::PgSnapshotRepository;
