//! In-memory walker for testing.

use crate::error::Result;
use crate::models::FileInfo;
use crate::walker::memory::MemoryTree;
use crate::walker::{BoxSyncRead, Walker};
use std::path::{Path, PathBuf};

/// In-memory walker for testing.
///
/// Ideal for unit tests that need a [`Walker`] without touching the
/// filesystem.
///
/// # Examples
///
/// ```
/// use hoist_storage::{MockWalker, Walker};
/// use std::path::Path;
///
/// let walker = MockWalker::with_files([
///     ("scitran/Anxiety Study/notes.txt", b"notes".as_slice()),
/// ]);
/// assert_eq!(walker.read(Path::new("scitran/Anxiety Study/notes.txt")).unwrap(), b"notes");
/// ```
pub struct MockWalker {
    name: String,
    tree: MemoryTree,
}

impl MockWalker {
    /// Create a mock walker pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut tree = MemoryTree::default();
        for (path, data) in files {
            let path = path.into();
            if tree.insert(&path, data.into(), None).is_err() {
                // Deliberate: MockWalker is only used in tests.
                panic!("MockWalker::with_files: invalid path {}", path.display());
            }
        }
        Self {
            name: "mock".to_string(),
            tree,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Walker for MockWalker {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_invalid_path_panics() {
        MockWalker::with_files([("../escape", b"x".as_slice())]);
    }

    #[test]
    fn test_with_name() {
        let walker = MockWalker::with_files([("a", b"x".as_slice())]).with_name("fixture");
        assert_eq!(walker.name(), "fixture");
    }
}
