//! Cold storage for old events.
//!
//! The compactor runs as a batch job next to the live system. Reads only
//! touch the archive when full replay needs events a purge removed. It turns events older than the retention window into
//! either per-event [`CompressedEvent`](questlog_core::archive::CompressedEvent)
//! records or per-window [`EventRollup`](questlog_core::archive::EventRollup)
//! summaries.

pub mod compression;
pub mod rollup;
pub mod statistics;

mod compactor;
mod policy;

pub use compactor::{ArchivalCompactor, CompactionReport};
pub use policy::ArchivalPolicy;
pub use statistics::EventStorageStatistics;
