//! Walker models.

use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// What a directory entry is, after symlink policy has been applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata for one entry returned by a [`Walker`](crate::Walker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Path relative to the walker root
    pub path: PathBuf,
    /// Final path component
    pub name: String,
    pub kind: EntryKind,
    /// The entry was reached through a symbolic link
    pub is_link: bool,
    /// Size in bytes (zero for directories)
    pub size: u64,
    pub modified: Option<OffsetDateTime>,
    pub created: Option<OffsetDateTime>,
}
impl FileInfo {
    /// A regular file with no timestamps.
    pub fn file(path: impl Into<PathBuf>, size: u64) -> Self {
        Self::new(path, EntryKind::File, size)
    }

    /// A directory with no timestamps.
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EntryKind::Directory, 0)
    }

    fn new(path: impl Into<PathBuf>, kind: EntryKind, size: u64) -> Self {
        let path = path.into();
        let name = file_name(&path);
        Self {
            path,
            name,
            kind,
            is_link: false,
            size,
            modified: None,
            created: None,
        }
    }

    pub fn with_modified(mut self, modified: impl Into<Option<OffsetDateTime>>) -> Self {
        self.modified = modified.into();
        self
    }

    pub fn with_created(mut self, created: impl Into<Option<OffsetDateTime>>) -> Self {
        self.created = created.into();
        self
    }

    pub fn with_link(mut self, is_link: bool) -> Self {
        self.is_link = is_link;
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}
