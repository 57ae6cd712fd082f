//! A small multi-group worker pool.
//!
//! Each group (for example "packfile" and "upload") has its own channel
//! and its own fixed number of worker threads. Tasks may hand back a
//! follow-up task for another group; a supervisor thread forwards it into
//! that group's channel, which is how packaging and uploading overlap.
//! Failed tasks are collected rather than retried, so the caller can decide
//! whether to [requeue](WorkQueue::requeue_errors) the batch.

pub mod error;
mod queue;
mod task;

pub use crate::queue::{Failure, GroupStats, WorkQueue};
pub use crate::task::{BoxTask, Progress, Task};
