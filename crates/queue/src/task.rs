use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub type BoxTask = Box<dyn Task>;

/// Byte counter a task updates while it runs.
///
/// Read concurrently by whoever polls [`WorkQueue::stats`](crate::WorkQueue::stats).
#[derive(Clone, Debug, Default)]
pub struct Progress(Arc<AtomicU64>);

impl Progress {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, bytes: u64) {
        self.0.store(bytes, Ordering::Relaxed);
    }

    pub fn add(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// A unit of work.
///
/// Tasks are executed on a worker thread of their [`group`](Task::group).
/// A task that fails stays inspectable and may be executed again after
/// [`WorkQueue::requeue_errors`](crate::WorkQueue::requeue_errors), so
/// `execute` must start from scratch every time.
pub trait Task: Send {
    fn group(&self) -> &'static str;

    /// Run the task, optionally producing a follow-up task.
    ///
    /// The follow-up is enqueued in the same step that marks this task
    /// completed.
    fn execute(&mut self, progress: &Progress) -> Result<Option<BoxTask>>;

    /// Short human-readable description for logs and error listings.
    fn describe(&self) -> String;
}
