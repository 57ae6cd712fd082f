//! Hierarchy Error Types

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A hierarchy error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for hierarchy operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Looking up an existing container failed
    #[display("could not resolve {_0}")]
    Resolver(#[error(not(source))] String),
    /// Creating a container failed
    #[display("could not create {_0}")]
    Create(#[error(not(source))] String),
    /// Uploading a file failed
    #[display("could not upload {_0}")]
    Upload(#[error(not(source))] String),
    /// A context key or value can't be applied
    #[display("invalid context key: {_0}")]
    InvalidContext(#[error(not(source))] String),
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
        matches!(self, Self::Resolver(_) | Self::Upload(_) | Self::Io(_))
    }
}
