//! CLI Error Types

use derive_more::{Display, Error};
use std::io::Error as IoError;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("invalid configuration")]
    Config,
    /// The import source could not be opened
    #[display("could not open {_0}")]
    Source(#[error(not(source))] String),
    #[display("could not prepare the output folder")]
    Output,
    #[display("import failed")]
    Import,
    /// Bad combination of command-line arguments
    #[display("{_0}")]
    Usage(#[error(not(source))] String),
    #[display("could not set up logging: {_0}")]
    Logging(#[error(not(source))] String),
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
