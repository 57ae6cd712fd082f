//! Import Error Types

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// An import error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for import operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of an import failure.
///
/// ### Configuration Errors
/// Raised before discovery starts; nothing has been touched yet.
/// - [`ErrorKind::Template`]
/// - [`ErrorKind::UnknownProfile`]
///
/// ### Operational Errors
/// - [`ErrorKind::Conflict`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Packfile`]
/// - [`ErrorKind::Dicom`]
/// - [`ErrorKind::Hierarchy`]
/// - [`ErrorKind::Upload`]
/// - [`ErrorKind::Queue`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Malformed template string, unknown option or unknown scanner
    #[display("invalid template: {_0}")]
    Template(#[error(not(source))] String),
    #[display("unknown de-identification profile: {_0}")]
    UnknownProfile(#[error(not(source))] String),
    /// Reading from the source walker failed
    #[display("could not read source")]
    Storage,
    /// Building a packfile failed
    #[display("could not create packfile {_0}")]
    Packfile(#[error(not(source))] String),
    #[display("could not read DICOM data")]
    Dicom,
    /// Resolving or creating containers failed
    #[display("container hierarchy error")]
    Hierarchy,
    #[display("could not upload {_0}")]
    Upload(#[error(not(source))] String),
    /// The work queue could not be started or fed
    #[display("work queue error")]
    Queue,
    /// Containers with these UIDs already exist remotely
    #[display("UID conflicts found: {}", _0.join(", "))]
    Conflict(#[error(not(source))] Vec<String>),
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
        matches!(self, Self::Storage | Self::Upload(_) | Self::Io(_))
    }
}
