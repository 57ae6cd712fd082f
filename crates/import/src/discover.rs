//! Template-driven discovery of a source tree.
//!
//! Directories are visited depth first from an explicit stack. Each visit
//! files the directory's loose files, classifies its subdirectories with the
//! template and finally resolves the directory's own context against the
//! container factory. A directory's subtree is always finished before its
//! siblings are started.

use crate::consts::IGNORED_NAMES;
use crate::error::{ErrorKind, Result};
use crate::scanner::ScanOptions;
use crate::template::{NodeRef, Template};
use exn::ResultExt;
use glob::Pattern;
use hoist_hierarchy::{ContainerFactory, DiscoveryContext, Message, NodeId, PackfileDescriptor};
use hoist_storage::{FileInfo, Walker};
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::instrument;

static IGNORE_PATTERNS: LazyLock<Vec<Pattern>> =
    LazyLock::new(|| IGNORED_NAMES.iter().filter_map(|name| Pattern::new(name).ok()).collect());

pub(crate) fn should_ignore(name: &str) -> bool {
    IGNORE_PATTERNS.iter().any(|pattern| pattern.matches(name))
}

#[derive(Clone, Default)]
pub struct DiscoveryOptions {
    /// Fill in a missing subject or session from the other one
    pub merge_subject_and_session: bool,
    pub scan: ScanOptions,
}

struct VisitTarget {
    path: PathBuf,
    /// Whether containers may be created for this directory
    resolve: bool,
    context: DiscoveryContext,
    node: Option<NodeRef>,
}

struct Discovery<'a> {
    walker: &'a dyn Walker,
    factory: &'a mut ContainerFactory,
    options: &'a DiscoveryOptions,
    descriptors: Vec<PackfileDescriptor>,
    /// Container and index into `descriptors`
    attachments: Vec<(NodeId, usize)>,
    messages: Vec<Message>,
}

/// Walk the whole tree, adding what's found to `factory`.
///
/// Returns the warnings collected along the way. Errors are reserved for
/// failures that make the walk itself impossible (an unreadable directory,
/// a resolver failure).
#[instrument(skip_all, fields(walker = walker.name()))]
pub fn discover(
    walker: &dyn Walker,
    factory: &mut ContainerFactory,
    template: &Template,
    initial: DiscoveryContext,
    options: &DiscoveryOptions,
) -> Result<Vec<Message>> {
    let mut discovery = Discovery {
        walker,
        factory,
        options,
        descriptors: Vec::new(),
        attachments: Vec::new(),
        messages: Vec::new(),
    };
    let mut stack = vec![VisitTarget {
        path: PathBuf::new(),
        resolve: true,
        context: initial,
        node: Some(template.root().clone()),
    }];
    while let Some(target) = stack.pop() {
        discovery.visit(target, &mut stack)?;
    }
    discovery.finish()
}

impl Discovery<'_> {
    fn visit(&mut self, target: VisitTarget, stack: &mut Vec<VisitTarget>) -> Result<()> {
        let VisitTarget {
            path,
            mut resolve,
            mut context,
            node,
        } = target;
        tracing::trace!(path = %path.display(), "visiting");
        let entries = self.walker.list_dir(&path).or_raise(|| ErrorKind::Storage)?;
        let (dirs, files): (Vec<FileInfo>, Vec<FileInfo>) =
            entries.into_iter().filter(|entry| !should_ignore(&entry.name)).partition(|entry| entry.is_dir());

        for file in files {
            match context.packfile_desc {
                Some(index) => self.descriptors[index].count += 1,
                None => context.files.push(file.path),
            }
        }

        for dir in dirs {
            let mut child = context.child();
            let mut next = None;
            if context.packfile.is_none() {
                match &node {
                    Some(node) if !node.is_terminal() => {
                        next = node.extract_metadata(&dir.name, &mut child)?;
                    },
                    _ => child.packfile = Some(dir.name.clone()),
                }
            }
            if child.ignore {
                tracing::debug!(path = %dir.path.display(), "ignored by template");
                continue;
            }
            if let Some(packfile_type) = &child.packfile
                && child.packfile_desc.is_none()
            {
                let mut descriptor = PackfileDescriptor::directory(packfile_type.clone(), &dir.path);
                descriptor.name.clone_from(&child.packfile_name);
                child.packfile_desc = Some(self.descriptors.len());
                self.descriptors.push(descriptor);
            }

            if let Some(kind) = next.as_ref().and_then(|node| node.scanner()) {
                tracing::debug!(path = %dir.path.display(), scanner = %kind, "handing over to scanner");
                let mut scanner = kind.create(&self.options.scan);
                let messages = scanner.discover(self.walker, &child, self.factory, &dir.path)?;
                self.messages.extend(messages);
                resolve = false;
                continue;
            }
            stack.push(VisitTarget {
                path: dir.path,
                resolve: context.packfile.is_none(),
                context: child,
                node: next,
            });
        }

        if self.options.merge_subject_and_session {
            context.merge_subject_and_session();
        }
        self.resolve(&path, resolve, context)
    }

    fn resolve(&mut self, path: &std::path::Path, resolve: bool, context: DiscoveryContext) -> Result<()> {
        let container = self.factory.resolve(&context, resolve).or_raise(|| ErrorKind::Hierarchy)?;
        match (container, context.packfile_desc) {
            (Some(id), Some(index)) if resolve => self.attachments.push((id, index)),
            (Some(id), _) => self.factory.node_mut(id).files.extend(context.files),
            (None, desc) if resolve && (desc.is_some() || !context.files.is_empty()) => {
                self.messages.push(Message::warn(format!(
                    "Ignoring files for folder {} because it represents an ambiguous node",
                    path.display()
                )));
            },
            (None, _) => {},
        }
        Ok(())
    }

    /// Attach packfiles once their whole subtree has been counted.
    fn finish(self) -> Result<Vec<Message>> {
        for (id, index) in self.attachments {
            let descriptor = &self.descriptors[index];
            if descriptor.count == 0 {
                tracing::debug!(packfile = %descriptor.display_name(), "skipping empty packfile");
                continue;
            }
            self.factory.node_mut(id).packfiles.push(descriptor.clone());
        }
        Ok(self.messages)
    }
}
