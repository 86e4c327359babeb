//! # capture-sync
//!
//! The queue coordinator: the only component that mutates the upload
//! queue. It persists every change, attempts captures one at a time, and
//! drains the queue when connectivity returns or the user asks for it.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;

mod retry;

#[cfg(test)]
mod testing;

pub use config::SyncConfig;
pub use coordinator::{AttemptOutcome, QueueCoordinator};
pub use error::SyncError;
pub use events::{DrainSummary, SyncEvent};
