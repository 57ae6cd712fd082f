//! Walk the contents of a zip or tar archive as if it were a directory.

use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::walker::memory::MemoryTree;
use crate::walker::{BoxSyncRead, Walker};
use hoist_compress::{ArchiveEntry, ArchiveFormat, read_archive};
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use time::OffsetDateTime;
use tracing::instrument;

/// An archive expanded into memory.
///
/// Import sources are bounded by what the user hands us on the command
/// line, so the archive is read once up front and every later listing is
/// served from memory.
pub struct ArchiveWalker {
    name: String,
    tree: MemoryTree,
}
impl ArchiveWalker {
    /// Expand an archive stream.
    #[instrument(skip_all, fields(name = %name.as_ref(), format = %format))]
    pub fn from_reader<R: Read + Seek + Send>(name: impl AsRef<str>, format: ArchiveFormat, reader: R) -> Result<Self> {
        let entries = read_archive(format, reader).map_err(ErrorKind::archive)?;
        Self::from_entries(name.as_ref(), entries)
    }

    /// Expand an archive file found inside another walker.
    ///
    /// The format is taken from the file extension.
    pub fn open(walker: &dyn Walker, path: &Path) -> Result<Self> {
        let Some(format) = ArchiveFormat::from_path(path) else {
            exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
        };
        let data = walker.read(path)?;
        Self::from_reader(path.display().to_string(), format, Cursor::new(data))
    }

    /// Build a walker from already-expanded entries.
    pub fn from_entries(name: impl Into<String>, entries: Vec<ArchiveEntry>) -> Result<Self> {
        let mut tree = MemoryTree::default();
        for entry in entries {
            let modified = entry.modified.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());
            tree.insert(&entry.path, entry.data, modified)?;
        }
        let name = name.into();
        tracing::debug!(name = %name, files = tree.len(), "expanded archive");
        Ok(Self { name, tree })
    }
}

impl Walker for ArchiveWalker {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<FileInfo>> {
        self.tree.list_dir(path)
    }

    fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.tree.stat(path)
    }

    fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        self.tree.reader(path)
    }
}
