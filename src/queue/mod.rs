//! Serial question pipeline
//!
//! `jobs` holds the FIFO state machine; `workers` runs it on a single task
//! that owns the chat session and publishes snapshots to observers.

pub mod jobs;
pub mod workers;

pub use jobs::{MessageQueue, PendingRequest, QueueState};
pub use workers::{ChatHandle, ChatSnapshot, QueueError, QueueWorker};
