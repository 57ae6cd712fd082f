//! In-memory tree shared by the archive and mock walkers.

use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::{validate as validate_path, validate_dir};
use crate::walker::BoxSyncRead;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;

/// Reference-counted file contents, so readers don't copy the buffer.
#[derive(Clone)]
struct Shared(Arc<Vec<u8>>);
impl AsRef<[u8]> for Shared {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

struct Blob {
    data: Shared,
    modified: Option<OffsetDateTime>,
}

/// Files keyed by validated path; directories are implied by their members.
#[derive(Default)]
pub(crate) struct MemoryTree {
    files: BTreeMap<PathBuf, Blob>,
    dirs: BTreeSet<PathBuf>,
}

impl MemoryTree {
    pub(crate) fn insert(&mut self, path: &Path, data: Vec<u8>, modified: Option<OffsetDateTime>) -> Result<()> {
        let path = validate_path(path)?;
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir.as_os_str().is_empty() || !self.dirs.insert(dir.to_path_buf()) {
                break;
            }
            parent = dir.parent();
        }
        self.files.insert(
            path,
            Blob {
                data: Shared(Arc::new(data)),
                modified,
            },
        );
        Ok(())
    }

    pub(crate) fn list_dir(&self, path: &Path) -> Result<Vec<FileInfo>> {
        let dir = validate_dir(path)?;
        if !dir.as_os_str().is_empty() && !self.dirs.contains(&dir) {
            exn::bail!(ErrorKind::NotFound(dir));
        }
        let is_child = |candidate: &Path| candidate.parent() == Some(dir.as_path());
        let mut entries: Vec<FileInfo> = self
            .dirs
            .iter()
            .filter(|d| is_child(d))
            .map(FileInfo::directory)
            .chain(self.files.iter().filter(|(p, _)| is_child(p)).map(|(p, blob)| Self::info(p, blob)))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub(crate) fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = validate_dir(path)?;
        if let Some(blob) = self.files.get(&path) {
            return Ok(Self::info(&path, blob));
        }
        match path.as_os_str().is_empty() || self.dirs.contains(&path) {
            true => Ok(FileInfo::directory(path)),
            false => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    pub(crate) fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        let path = validate_path(path)?;
        match self.files.get(&path) {
            Some(blob) => Ok(Box::new(Cursor::new(blob.data.clone()))),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.files.len()
    }

    fn info(path: &Path, blob: &Blob) -> FileInfo {
        FileInfo::file(path, blob.data.0.len() as u64).with_modified(blob.modified)
    }
}
