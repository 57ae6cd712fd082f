//! Resolve-or-create of container nodes from discovery contexts.

use crate::context::{DiscoveryContext, LevelMeta};
use crate::error::{ErrorKind, Result};
use crate::node::{ContainerNode, NodeId};
use crate::resolver::{ResolverHandle, UidRequest, UploadTarget};
use crate::ContainerKind;
use exn::ResultExt;
use std::collections::{BTreeMap, VecDeque};
use tracing::instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cursor {
    Root,
    Node(NodeId),
}

/// Builds the in-memory container tree.
///
/// Nodes live in an arena and refer to each other by [`NodeId`]; the
/// implicit root always "exists".
///
/// # Examples
///
/// ```no_run
/// use hoist_hierarchy::{ContainerFactory, DiscoveryContext, FolderResolver};
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut factory = ContainerFactory::new(Arc::new(FolderResolver::new("/tmp/out")?));
/// let mut ctx = DiscoveryContext::default();
/// ctx.set("group._id", "scitran")?;
/// ctx.set("project.label", "Anxiety Study")?;
/// let project = factory.resolve(&ctx, true)?;
/// assert_eq!(project, factory.resolve(&ctx, true)?);
/// # Ok(())
/// # }
/// ```
pub struct ContainerFactory {
    resolver: ResolverHandle,
    /// Match children on label *and* uid, so two studies that share a
    /// human label stay apart.
    uids: bool,
    nodes: Vec<ContainerNode>,
    roots: Vec<NodeId>,
}

impl ContainerFactory {
    pub fn new(resolver: ResolverHandle) -> Self {
        Self {
            resolver,
            uids: true,
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    pub fn with_uids(mut self, uids: bool) -> Self {
        self.uids = uids;
        self
    }

    pub fn resolver(&self) -> &ResolverHandle {
        &self.resolver
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &ContainerNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ContainerNode {
        &mut self.nodes[id.0]
    }

    pub fn groups(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn first_project(&self) -> Option<NodeId> {
        let group = self.roots.first()?;
        self.node(*group).children.first().copied()
    }

    /// Resolve the deepest container `ctx` describes.
    ///
    /// Levels are visited from group down to acquisition. A level present
    /// after a missing one makes the context ambiguous and resolves to
    /// `None`; trailing missing levels resolve to the deepest node found. A
    /// context with no levels at all resolves to `None`.
    ///
    /// With `create = false`, any node that doesn't exist in memory yet
    /// resolves to `None` instead of being added.
    pub fn resolve(&mut self, ctx: &DiscoveryContext, create: bool) -> Result<Option<NodeId>> {
        let mut last: Option<Cursor> = None;
        let mut current = Some(Cursor::Root);
        let mut path = String::new();
        for kind in ContainerKind::ALL {
            match ctx.level(kind) {
                Some(meta) => {
                    let Some(cursor) = current else {
                        return Ok(None);
                    };
                    last = Some(cursor);
                    let Some(child) = self.resolve_child(cursor, kind, meta, &path, create)? else {
                        return Ok(None);
                    };
                    path = combine_path(&path, &self.resolver.path_el(self.node(child)));
                    current = Some(Cursor::Node(child));
                },
                None => {
                    if current.is_some() {
                        last = current;
                    }
                    current = None;
                },
            }
        }
        match current.or(last) {
            Some(Cursor::Node(id)) => Ok(Some(id)),
            _ => Ok(None),
        }
    }

    fn children_of(&self, cursor: Cursor) -> &[NodeId] {
        match cursor {
            Cursor::Root => &self.roots,
            Cursor::Node(id) => &self.node(id).children,
        }
    }

    fn resolve_child(
        &mut self,
        parent: Cursor,
        kind: ContainerKind,
        meta: &LevelMeta,
        path: &str,
        create: bool,
    ) -> Result<Option<NodeId>> {
        let children = self.children_of(parent).to_vec();
        for child_id in children {
            let child = self.node(child_id);
            if meta.id.is_some() && child.id == meta.id {
                return Ok(Some(child_id));
            }
            if meta.label.is_some() && child.label == meta.label && (!self.uids || child.uid == meta.uid) {
                // Resolved elsewhere by label; keep the id we've now learnt.
                let child = self.node_mut(child_id);
                if child.id.is_none() && meta.id.is_some() {
                    child.id.clone_from(&meta.id);
                }
                return Ok(Some(child_id));
            }
        }
        if !create {
            return Ok(None);
        }

        let parent_id = match parent {
            Cursor::Root => None,
            Cursor::Node(id) => Some(id),
        };
        let mut child = ContainerNode::new(kind, meta, parent_id);
        let parent_exists = parent_id.is_none_or(|id| self.node(id).exists);
        if parent_exists {
            let child_path = combine_path(path, &self.resolver.path_el(&child));
            let found = self
                .resolver
                .resolve_path(kind, &child_path)
                .or_raise(|| ErrorKind::Resolver(child_path.clone()))?;
            if let Some((id, uid)) = found {
                tracing::debug!(kind = %kind, path = %child_path, id = %id, "container already exists");
                child.id = Some(id);
                if uid.is_some() {
                    child.uid = uid;
                }
                child.exists = true;
            }
        }

        let child_id = NodeId(self.nodes.len());
        self.nodes.push(child);
        match parent_id {
            None => self.roots.push(child_id),
            Some(id) => self.node_mut(id).children.push(child_id),
        }
        Ok(Some(child_id))
    }

    /// Breadth-first `(parent, node)` pairs, parents always before children.
    pub fn walk(&self) -> Vec<(Option<NodeId>, NodeId)> {
        let mut queue: VecDeque<(Option<NodeId>, NodeId)> = self.roots.iter().map(|id| (None, *id)).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some((parent, current)) = queue.pop_front() {
            queue.extend(self.node(current).children.iter().map(|child| (Some(current), *child)));
            order.push((parent, current));
        }
        order
    }

    /// Create every container that doesn't exist yet, parents first.
    ///
    /// Returns how many containers were created.
    #[instrument(skip_all)]
    pub fn create_containers(&mut self) -> Result<usize> {
        let mut created = 0;
        for (parent, child) in self.walk() {
            if self.node(child).exists {
                continue;
            }
            let node = self.node(child);
            let id = self
                .resolver
                .create_container(parent.map(|p| self.node(p)), node)
                .or_raise(|| ErrorKind::Create(format!("{} {}", node.kind, node.display_name())))?;
            tracing::debug!(kind = %node.kind, label = node.display_name(), id = %id, "created container");
            let node = self.node_mut(child);
            node.id = Some(id);
            node.exists = true;
            created += 1;
        }
        Ok(created)
    }

    /// Check session and acquisition UIDs for conflicts.
    ///
    /// A UID seen twice within this scan is a conflict; the rest are sent to
    /// the resolver in one batch. Returns the number of UID-bearing nodes
    /// and the conflicting nodes. Nothing is modified.
    #[instrument(skip_all)]
    pub fn check_container_unique_uids(&self) -> Result<(usize, Vec<NodeId>)> {
        let mut count = 0;
        let mut seen: BTreeMap<ContainerKind, BTreeMap<String, NodeId>> = BTreeMap::new();
        let mut conflicts = Vec::new();
        for (_, id) in self.walk() {
            let node = self.node(id);
            let Some(uid) = node.uid.as_ref().filter(|_| node.kind.has_unique_uid()) else {
                continue;
            };
            count += 1;
            let by_uid = seen.entry(node.kind).or_default();
            if by_uid.contains_key(uid) {
                conflicts.push(id);
                continue;
            }
            by_uid.insert(uid.clone(), id);
        }

        tracing::debug!(count, "checking UIDs");
        if count > 0 {
            let request: UidRequest =
                seen.iter().map(|(kind, by_uid)| (*kind, by_uid.keys().cloned().collect())).collect();
            let result = self
                .resolver
                .check_unique_uids(&request)
                .or_raise(|| ErrorKind::Resolver("unique UIDs".to_string()))?;
            for (kind, uids) in result {
                let Some(by_uid) = seen.get(&kind) else { continue };
                conflicts.extend(uids.iter().filter_map(|uid| by_uid.get(uid)).copied());
            }
        }
        Ok((count, conflicts))
    }

    /// Snapshot of where uploads for `id` go. `None` until the container
    /// has a remote id.
    pub fn target(&self, id: NodeId) -> Option<UploadTarget> {
        let node = self.node(id);
        Some(UploadTarget {
            kind: node.kind,
            id: node.id.clone()?,
            label: node.label.clone(),
        })
    }

    /// Number of containers of `kind`.
    pub fn count(&self, kind: ContainerKind) -> usize {
        self.nodes.iter().filter(|node| node.kind == kind).count()
    }
}

fn combine_path(path: &str, child: &str) -> String {
    match path.is_empty() {
        true => child.to_string(),
        false => format!("{path}/{child}"),
    }
}
