//! Application layer: command, query, and event handlers.

pub mod command_handlers;
pub mod event_handlers;
pub mod query_handlers;
