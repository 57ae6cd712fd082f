//! DICOM Error Types

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A DICOM error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for DICOM operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The stream is not a DICOM part 10 file, or could not be parsed as one
    #[display("not a DICOM file")]
    NotDicom,
    /// A header required for grouping is absent
    #[display("DICOM is missing {_0}")]
    MissingField(#[error(not(source))] &'static str),
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// The transformed object could not be serialized
    #[display("could not write DICOM: {_0}")]
    Write(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
