use crate::ContainerKind;
use crate::context::LevelMeta;
use std::path::PathBuf;

/// Index of a node in the [`ContainerFactory`](crate::ContainerFactory) arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

/// Where the files of a packfile come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackfileSource {
    /// Every file below a directory; member names are relative to it.
    Directory(PathBuf),
    /// An explicit list of walker paths.
    Paths(Vec<PathBuf>),
}

/// A group of source files that will be uploaded as one zip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackfileDescriptor {
    pub packfile_type: String,
    pub source: PackfileSource,
    pub count: usize,
    /// Explicit output file name
    pub name: Option<String>,
}

impl PackfileDescriptor {
    pub fn directory(packfile_type: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            packfile_type: packfile_type.into(),
            source: PackfileSource::Directory(path.into()),
            count: 0,
            name: None,
        }
    }

    pub fn paths(packfile_type: impl Into<String>, paths: Vec<PathBuf>, name: Option<String>) -> Self {
        Self {
            packfile_type: packfile_type.into(),
            count: paths.len(),
            source: PackfileSource::Paths(paths),
            name,
        }
    }

    /// Name shown in summaries.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.packfile_type)
    }
}

/// One real-world container.
#[derive(Clone, Debug)]
pub struct ContainerNode {
    pub kind: ContainerKind,
    /// Remote identifier, once resolved or created
    pub id: Option<String>,
    pub uid: Option<String>,
    pub label: Option<String>,
    /// Already present remotely
    pub exists: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Loose files, uploaded individually
    pub files: Vec<PathBuf>,
    pub packfiles: Vec<PackfileDescriptor>,
    /// The level metadata the node was created from
    pub meta: LevelMeta,
}

impl ContainerNode {
    pub(crate) fn new(kind: ContainerKind, meta: &LevelMeta, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            id: meta.id.clone(),
            uid: meta.uid.clone(),
            label: meta.label.clone(),
            exists: false,
            parent,
            children: Vec::new(),
            files: Vec::new(),
            packfiles: Vec::new(),
            meta: meta.clone(),
        }
    }

    /// Label, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().or(self.id.as_deref()).unwrap_or_default()
    }
}
