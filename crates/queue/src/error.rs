//! Queue Error Types

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A queue error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for queue and task operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A task returned an error
    #[display("{_0} failed")]
    Task(#[error(not(source))] String),
    /// A task panicked while executing
    #[display("{_0} panicked: {_1}")]
    Panicked(#[error(not(source))] String, #[error(not(source))] String),
    /// A task was enqueued into a group with no workers
    #[display("unknown work group: {_0}")]
    UnknownGroup(#[error(not(source))] String),
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Task(_) | Self::Io(_))
    }
}
