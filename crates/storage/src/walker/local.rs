//! Local filesystem walker.
//!
//! Reads a directory tree with blocking `std::fs` calls. Discovery runs on a
//! single thread and uploads stream files from worker threads, so there's no
//! async runtime to feed.

use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::{validate as validate_path, validate_dir};
use crate::walker::{BoxSyncRead, Walker};
use std::fs::{self, File, Metadata};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Local filesystem walker.
///
/// All paths are relative to the configured root directory. Symbolic links
/// are followed only when `follow_symlinks` is set; otherwise they are
/// skipped during listing.
///
/// # Examples
///
/// ```no_run
/// use hoist_storage::{LocalWalker, Walker};
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let walker = LocalWalker::new("local", "/data/import", false)?;
/// for entry in walker.list_dir(Path::new(""))? {
///     println!("{}", entry.name);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalWalker {
    name: String,
    root: PathBuf,
    follow_symlinks: bool,
}
impl LocalWalker {
    /// Create a walker rooted at an existing directory.
    ///
    /// # Errors
    ///
    /// Returns [`NotFound`](ErrorKind::NotFound) if the root does not exist,
    /// or [`InvalidPath`](ErrorKind::InvalidPath) if it isn't a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>, follow_symlinks: bool) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let metadata = fs::metadata(&root).map_err(|e| Self::map_io_error(e, &root))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self {
            name: name.into(),
            root,
            follow_symlinks,
        })
    }

    /// The directory this walker is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_dir(&self, path: &Path) -> Result<(PathBuf, PathBuf)> {
        let relative = validate_dir(path)?;
        Ok((self.root.join(&relative), relative))
    }

    fn info(relative: PathBuf, metadata: &Metadata, is_link: bool) -> FileInfo {
        let info = match metadata.is_dir() {
            true => FileInfo::directory(relative),
            false => FileInfo::file(relative, metadata.len()),
        };
        info.with_modified(metadata.modified().ok().map(OffsetDateTime::from))
            .with_created(metadata.created().ok().map(OffsetDateTime::from))
            .with_link(is_link)
    }

    /// Whether a directory link resolves to `parent` or one of its ancestors,
    /// in which case following it would never end.
    fn loops_back(&self, link: &Path, parent: &Path) -> bool {
        let Ok(target) = fs::canonicalize(link) else {
            return false;
        };
        parent.ancestors().any(|dir| fs::canonicalize(self.root.join(dir)).is_ok_and(|dir| dir == target))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }
}

impl Walker for LocalWalker {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<FileInfo>> {
        let (absolute, relative) = self.absolute_dir(path)?;
        let entries = fs::read_dir(&absolute).map_err(|e| Self::map_io_error(e, &absolute))?;
        let mut infos = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Self::map_io_error(e, &absolute))?;
            let entry_path = entry.path();
            let link_meta = entry.metadata().map_err(|e| Self::map_io_error(e, &entry_path))?;
            let is_link = link_meta.file_type().is_symlink();
            let metadata = match is_link {
                false => link_meta,
                true if !self.follow_symlinks => {
                    tracing::debug!(path = %entry_path.display(), "skipping symbolic link");
                    continue;
                },
                true => match fs::metadata(&entry_path) {
                    Ok(target) => target,
                    Err(err) => {
                        tracing::warn!(path = %entry_path.display(), error = %err, "skipping broken symbolic link");
                        continue;
                    },
                },
            };
            if !metadata.is_dir() && !metadata.is_file() {
                continue;
            }
            if is_link && metadata.is_dir() && self.loops_back(&entry_path, &relative) {
                tracing::warn!(path = %entry_path.display(), "skipping symbolic link loop");
                continue;
            }
            let child = relative.join(entry.file_name());
            infos.push(Self::info(child, &metadata, is_link));
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    fn stat(&self, path: &Path) -> Result<FileInfo> {
        let (absolute, relative) = self.absolute_dir(path)?;
        let link_meta = fs::symlink_metadata(&absolute).map_err(|e| Self::map_io_error(e, &absolute))?;
        let is_link = link_meta.file_type().is_symlink();
        let metadata = match is_link {
            true => fs::metadata(&absolute).map_err(|e| Self::map_io_error(e, &absolute))?,
            false => link_meta,
        };
        Ok(Self::info(relative, &metadata, is_link))
    }

    fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        let absolute = self.root.join(validate_path(path)?);
        let file = File::open(&absolute).map_err(|e| Self::map_io_error(e, &absolute))?;
        Ok(Box::new(BufReader::new(file)))
    }
}
