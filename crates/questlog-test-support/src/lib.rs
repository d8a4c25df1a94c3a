//! Shared test mocks and utilities for the Questlog character store.

mod aggregate;
mod clock;
mod handler;
mod repository;
mod snapshot;

pub use aggregate::{TALLY_INCREMENTED, TALLY_OPENED, Tally, TallyEvent, TallyEventKind, stored_event};
pub use clock::{FixedClock, ManualClock};
pub use handler::{FailingEventHandler, RecordingEventHandler};
pub use repository::{FailingEventRepository, RecordingEventRepository};
pub use snapshot::FailingSnapshotRepository;
