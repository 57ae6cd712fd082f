//! Byte-level plumbing for the import pipeline.
//!
//! - [`Compression`] sniffs and unwraps single-stream codecs (gzip, bzip2)
//!   so that `scan.dcm.gz` reads the same as `scan.dcm`.
//! - [`PeekableReader`] lets a caller sniff the head of a stream (DICOM
//!   preamble, archive magic) and then replay it untouched.
//! - [`PackWriter`] builds the zip packfiles that get uploaded, with an
//!   explicit [`PackLevel`] rather than a process-wide default.
//! - [`read_archive`] expands zip and tar sources into memory so they can be
//!   walked like a directory tree.

mod archive;
mod construct;
pub mod error;
mod ops;
mod pack;
mod peekable;
mod util;

pub use crate::archive::{ArchiveEntry, read_archive};
pub use crate::pack::{PackLevel, PackWriter};
pub use crate::peekable::PeekableReader;

/// A supported single-stream compression format.
///
/// Defaults to [`None`](Self::None) (uncompressed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Bzip2 compression (.bz2)
    Bzip2,
    /// Gzip compression (.gz)
    Gzip,
}

/// A multi-file container that can be expanded with [`read_archive`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// `.zip`
    Zip,
    /// `.tar`, optionally wrapped in a stream codec (`.tar.gz`, `.tgz`, `.tar.bz2`).
    Tar(Compression),
}
