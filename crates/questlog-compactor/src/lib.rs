//! Questlog archival compactor.
//!
//! A batch job: read configuration from the environment, connect to
//! `PostgreSQL`, run one compaction pass, prune old snapshots, and report
//! the resulting storage footprint.

pub mod config;
pub mod error;
pub mod job;
