//! A local directory standing in for the remote store.
//!
//! Every container is a directory: groups are named by id, everything else
//! by label. A container's id is its path relative to the output root.

use crate::error::{ErrorKind, Result};
use crate::resolver::{ContainerResolver, UidRequest, UploadTarget, Uploader};
use crate::{ContainerKind, ContainerNode};
use exn::OptionExt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct FolderResolver {
    root: PathBuf,
}

impl FolderResolver {
    /// Use `root` as the output folder, creating it if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(ErrorKind::Io)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

/// Path separators in labels would escape the container's directory.
fn sanitize(name: &str) -> String {
    match name.replace(['/', '\\'], "_") {
        // Would name the parent directory (or the directory itself).
        relative if matches!(relative.as_str(), "" | "." | "..") => "_".to_string(),
        name => name,
    }
}

impl ContainerResolver for FolderResolver {
    fn path_el(&self, node: &ContainerNode) -> String {
        match node.kind {
            ContainerKind::Group => sanitize(node.id.as_deref().unwrap_or_default()),
            _ => sanitize(node.display_name()),
        }
    }

    fn resolve_path(&self, _kind: ContainerKind, path: &str) -> Result<Option<(String, Option<String>)>> {
        Ok(self.absolute(path).is_dir().then(|| (path.to_string(), None)))
    }

    fn create_container(&self, parent: Option<&ContainerNode>, node: &ContainerNode) -> Result<String> {
        let path = match parent {
            Some(parent) => {
                let parent_id = parent
                    .id
                    .as_deref()
                    .ok_or_raise(|| ErrorKind::Create(format!("{} {}", node.kind, node.display_name())))?;
                format!("{parent_id}/{}", self.path_el(node))
            },
            None => self.path_el(node),
        };
        fs::create_dir_all(self.absolute(&path)).map_err(ErrorKind::Io)?;
        Ok(path)
    }

    /// Directories carry no UIDs, so nothing ever conflicts.
    fn check_unique_uids(&self, _request: &UidRequest) -> Result<UidRequest> {
        Ok(UidRequest::new())
    }
}

impl Uploader for FolderResolver {
    fn upload(&self, target: &UploadTarget, name: &str, source: &mut dyn Read, size: u64) -> Result<()> {
        let directory = self.absolute(&target.id);
        fs::create_dir_all(&directory).map_err(ErrorKind::Io)?;
        let path = directory.join(sanitize(name));
        let mut file = File::create(&path).map_err(ErrorKind::Io)?;
        let written = io::copy(source, &mut file).map_err(ErrorKind::Io)?;
        if written != size {
            tracing::debug!(path = %path.display(), expected = size, written, "size mismatch");
        }
        Ok(())
    }

    fn verb(&self) -> &'static str {
        "Copying"
    }
}
