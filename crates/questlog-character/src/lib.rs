//! Questlog — Character bounded context.
//!
//! Character sheets, experience, and combat history, persisted as an event
//! stream through the `questlog-engine` stores.

pub mod application;
pub mod domain;
