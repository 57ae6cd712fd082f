//! Contracts for the remote store.
//!
//! The container factory only ever talks to the remote side through
//! [`ContainerResolver`], and the upload pipeline through [`Uploader`]. A
//! single type usually implements both (see
//! [`FolderResolver`](crate::FolderResolver)).

use crate::error::Result;
use crate::{ContainerKind, ContainerNode};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

pub type ResolverHandle = Arc<dyn ContainerResolver + Send + Sync>;
pub type UploaderHandle = Arc<dyn Uploader + Send + Sync>;

/// UIDs to check (or found to conflict), by container kind.
pub type UidRequest = BTreeMap<ContainerKind, Vec<String>>;

pub trait ContainerResolver {
    /// The path element that addresses `node` below its parent.
    ///
    /// Groups are addressed by id; other containers by `<id:ID>` when the id
    /// is known, else by label.
    fn path_el(&self, node: &ContainerNode) -> String {
        match (node.kind, &node.id) {
            (ContainerKind::Group, Some(id)) => id.clone(),
            (_, Some(id)) => format!("<id:{id}>"),
            (_, None) => node.label.clone().unwrap_or_default(),
        }
    }

    /// Look up an existing container by path.
    ///
    /// Returns the remote id and (when the store knows one) uid, or `None`
    /// if nothing exists at `path`.
    fn resolve_path(&self, kind: ContainerKind, path: &str) -> Result<Option<(String, Option<String>)>>;

    /// Create `node` below `parent` (`None` for groups), returning its new id.
    fn create_container(&self, parent: Option<&ContainerNode>, node: &ContainerNode) -> Result<String>;

    /// The subset of `request` that already exists remotely.
    fn check_unique_uids(&self, request: &UidRequest) -> Result<UidRequest>;
}

/// The container an upload lands in.
///
/// A snapshot taken after containers have been created, so upload workers
/// never need to look at the container tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadTarget {
    pub kind: ContainerKind,
    pub id: String,
    pub label: Option<String>,
}

pub trait Uploader {
    /// Upload `size` bytes from `source` as `name` on `target`.
    fn upload(&self, target: &UploadTarget, name: &str, source: &mut dyn Read, size: u64) -> Result<()>;

    /// Whether parallel (signed URL) uploads are supported.
    fn supports_signed_url(&self) -> bool {
        false
    }

    /// Verb for progress output.
    fn verb(&self) -> &'static str {
        "Uploading"
    }
}
