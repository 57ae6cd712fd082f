//! Every file becomes part of an acquisition named after where it lives.

use crate::error::{ErrorKind, Result};
use crate::scanner::Scanner;
use exn::ResultExt;
use hoist_hierarchy::{ContainerFactory, ContainerKind, DiscoveryContext, LevelMeta, Message};
use hoist_storage::Walker;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::instrument;

pub struct SlurpScanner;

/// The acquisition a file is grouped into: its directory below the prefix,
/// or the part of its name before the first dot when it sits directly in
/// the prefix.
fn group_key(relative: &str) -> String {
    let key = match relative.rfind('/') {
        Some(index) => &relative[..index],
        None => relative.split('.').next().unwrap_or_default(),
    };
    key.trim_matches('/').replace('/', "_")
}

impl Scanner for SlurpScanner {
    #[instrument(skip_all, fields(prefix = %prefix.display()))]
    fn discover(
        &mut self,
        walker: &dyn Walker,
        ctx: &DiscoveryContext,
        factory: &mut ContainerFactory,
        prefix: &Path,
    ) -> Result<Vec<Message>> {
        let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for file in walker.files(prefix).or_raise(|| ErrorKind::Storage)? {
            let relative = file.path.strip_prefix(prefix).unwrap_or(&file.path);
            let key = group_key(&relative.to_string_lossy());
            if key.is_empty() {
                tracing::debug!(path = %file.path.display(), "no acquisition name");
                continue;
            }
            groups.entry(key).or_default().push(file.path);
        }

        let mut messages = Vec::new();
        for (label, files) in groups {
            let mut acquisition = ctx.child();
            acquisition.set_level(ContainerKind::Acquisition, LevelMeta::with_label(&label));
            match factory.resolve(&acquisition, true).or_raise(|| ErrorKind::Hierarchy)? {
                Some(node) => factory.node_mut(node).files.extend(files),
                None => messages.push(Message::warn(format!(
                    "Ignoring files for acquisition {label} because it represents an ambiguous node"
                ))),
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_hierarchy::FolderResolver;
    use hoist_storage::MockWalker;
    use rstest::rstest;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[rstest]
    #[case("a/b/c.txt", "a_b")]
    #[case("scan.nii.gz", "scan")]
    #[case("run1/notes", "run1")]
    #[case(".hidden", "")]
    fn test_group_key(#[case] relative: &str, #[case] expected: &str) {
        assert_eq!(group_key(relative), expected);
    }

    #[test]
    fn test_acquisitions_per_prefix() {
        let temp = TempDir::new().unwrap();
        let mut factory = ContainerFactory::new(Arc::new(FolderResolver::new(temp.path()).unwrap()));
        let walker = MockWalker::with_files([
            ("data/ses1/T1/a.nii", b"a".to_vec()),
            ("data/ses1/T1/b.nii", b"b".to_vec()),
            ("data/ses1/scan.json", b"{}".to_vec()),
        ]);
        let mut ctx = DiscoveryContext::default();
        ctx.set("group._id", "scitran").unwrap();
        ctx.set("project.label", "Anxiety Study").unwrap();
        ctx.set("subject.label", "s1").unwrap();
        ctx.set("session.label", "ses1").unwrap();

        let messages = SlurpScanner.discover(&walker, &ctx, &mut factory, Path::new("data/ses1")).unwrap();
        assert!(messages.is_empty());
        let labels: BTreeMap<_, _> = factory
            .walk()
            .into_iter()
            .map(|(_, id)| factory.node(id))
            .filter(|node| node.kind == ContainerKind::Acquisition)
            .map(|node| (node.label.clone().unwrap(), node.files.len()))
            .collect();
        assert_eq!(labels, BTreeMap::from([("T1".to_string(), 2), ("scan".to_string(), 1)]));
    }

    #[test]
    fn test_ambiguous_acquisitions_are_reported() {
        let temp = TempDir::new().unwrap();
        let mut factory = ContainerFactory::new(Arc::new(FolderResolver::new(temp.path()).unwrap()));
        let walker = MockWalker::with_files([("x/a.txt", b"a".to_vec())]);
        let mut ctx = DiscoveryContext::default();
        ctx.set("group._id", "scitran").unwrap();
        let messages = SlurpScanner.discover(&walker, &ctx, &mut factory, Path::new("")).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].text.contains("ambiguous"));
    }
}
