//! Questlog Core — shared event-sourcing abstractions.
//!
//! This crate defines the contracts every other crate depends on: events,
//! aggregates, the event log, the snapshot store, the archive store and
//! event handlers. It contains no infrastructure code.

pub mod aggregate;
pub mod archive;
pub mod clock;
pub mod error;
pub mod event;
pub mod handler;
pub mod repository;
pub mod snapshot;
