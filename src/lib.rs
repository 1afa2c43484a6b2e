//! Multi-channel notification delivery pipeline: one worker per channel
//! consuming from a channel queue, simulating delivery, persisting the
//! outcome, and publishing a completion event.

pub mod clients;
pub mod config;
pub mod models;
pub mod supervisor;
pub mod worker;
