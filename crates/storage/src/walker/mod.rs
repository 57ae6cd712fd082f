//! The walker trait and its implementations.
//!
//! A [`Walker`] is a read-only view of a source tree: list one directory,
//! stat an entry, open a file for streaming. Everything else (recursive
//! listing, content comparison) is built on those primitives so that local
//! disks, archives and object stores behave the same way during discovery.

mod archive;
mod local;
mod memory;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::archive::ArchiveWalker;
pub use self::local::LocalWalker;
#[cfg(feature = "mock")]
pub use self::mock::MockWalker;
#[cfg(feature = "s3")]
pub use self::s3::S3Walker;
use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::validate_dir;
use std::io::Read;
use std::path::{Path, PathBuf};

pub type BoxSyncRead = Box<dyn Read + Send + 'static>;

const COMPARE_CHUNK: usize = 64 * 1024;

/// Read-only access to a source tree.
///
/// # Path Handling
/// All paths are relative to the walker root. The root directory itself is
/// the empty path. Implementations validate paths with
/// [`validate_path`](crate::validate_path) / [`validate_dir`](crate::validate_dir).
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use hoist_storage::{Walker, error::Result};
///
/// fn count_dicoms(walker: &dyn Walker) -> Result<usize> {
///     Ok(walker
///         .files(Path::new("scitran"))?
///         .iter()
///         .filter(|info| info.name.ends_with(".dcm"))
///         .count())
/// }
/// ```
pub trait Walker: Send + Sync {
    /// Name of the walker, for logging.
    fn name(&self) -> &str;

    /// List the immediate children of a directory, sorted by name.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the
    /// directory does not exist.
    fn list_dir(&self, path: &Path) -> Result<Vec<FileInfo>>;

    /// Metadata for a single entry.
    fn stat(&self, path: &Path) -> Result<FileInfo>;

    /// Open a file for streaming reads.
    ///
    /// Returns a `'static` boxed [`Read`] so it can be handed to a worker
    /// thread. Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the
    /// file does not exist.
    fn reader(&self, path: &Path) -> Result<BoxSyncRead>;

    /// Read a whole file into memory.
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.reader(path)?.read_to_end(&mut data).map_err(ErrorKind::Io)?;
        Ok(data)
    }

    /// Every file below `prefix` (recursively), sorted by path.
    ///
    /// Walks with an explicit stack so deep trees can't exhaust the call
    /// stack.
    fn files(&self, prefix: &Path) -> Result<Vec<FileInfo>> {
        let mut stack: Vec<PathBuf> = vec![validate_dir(prefix)?];
        let mut files = Vec::new();
        while let Some(current) = stack.pop() {
            for entry in self.list_dir(&current)? {
                match entry.is_dir() {
                    true => stack.push(entry.path),
                    false => files.push(entry),
                }
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Compare two files byte-for-byte.
    ///
    /// Sizes are compared first; contents are only streamed when the sizes
    /// agree.
    fn files_equal(&self, a: &Path, b: &Path) -> Result<bool> {
        if self.stat(a)?.size != self.stat(b)?.size {
            return Ok(false);
        }
        let mut left = self.reader(a)?;
        let mut right = self.reader(b)?;
        let mut left_buf = vec![0u8; COMPARE_CHUNK];
        let mut right_buf = vec![0u8; COMPARE_CHUNK];
        loop {
            let left_len = fill(&mut left, &mut left_buf).map_err(ErrorKind::Io)?;
            let right_len = fill(&mut right, &mut right_buf).map_err(ErrorKind::Io)?;
            if left_len != right_len || left_buf[..left_len] != right_buf[..right_len] {
                return Ok(false);
            }
            if left_len == 0 {
                return Ok(true);
            }
        }
    }

    /// Release any resources held by the walker.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Read until `buf` is full or the stream ends.
fn fill(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {},
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
