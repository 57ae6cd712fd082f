//! Human-readable plan of what an import will do.

use crate::message::Message;
use crate::node::NodeId;
use crate::{ContainerFactory, ContainerKind};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

const SPACER: &str = "|   ";
const ENTRY: &str = "├── ";

/// How many containers of one kind are reused or created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KindCount {
    pub using: usize,
    pub creating: usize,
}

impl KindCount {
    pub fn total(&self) -> usize {
        self.using + self.creating
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SummaryCounts {
    pub containers: BTreeMap<ContainerKind, KindCount>,
    /// Loose files
    pub files: usize,
    pub packfiles: usize,
}

impl SummaryCounts {
    pub fn total(&self, kind: ContainerKind) -> usize {
        self.containers.get(&kind).map(KindCount::total).unwrap_or_default()
    }
}

impl ContainerFactory {
    /// Count containers, files and packfiles.
    pub fn counts(&self) -> SummaryCounts {
        let mut counts = SummaryCounts::default();
        for (_, id) in self.walk() {
            let node = self.node(id);
            let entry = counts.containers.entry(node.kind).or_default();
            match node.exists {
                true => entry.using += 1,
                false => entry.creating += 1,
            }
            counts.files += node.files.len();
            counts.packfiles += node.packfiles.len();
        }
        counts
    }

    /// Print the container tree, depth first with children sorted by name.
    pub fn print_summary(&self, out: &mut dyn Write) -> io::Result<SummaryCounts> {
        let mut stack: Vec<(usize, NodeId)> = self.sorted_desc(self.groups()).into_iter().map(|id| (0, id)).collect();
        while let Some((level, id)) = stack.pop() {
            let node = self.node(id);
            let status = match node.exists {
                true => "using",
                false => "creating",
            };
            write_entry(out, level, &format!("{} ({status})", node.display_name()))?;

            let mut files: Vec<&Path> = node.files.iter().map(|p| p.as_path()).collect();
            files.sort_by_key(|p| p.to_string_lossy().to_lowercase());
            for file in files {
                write_entry(out, level + 1, &file_name(file))?;
            }
            for packfile in &node.packfiles {
                write_entry(out, level + 1, &format!("{} ({} files)", packfile.display_name(), packfile.count))?;
            }
            stack.extend(self.sorted_desc(&node.children).into_iter().map(|child| (level + 1, child)));
        }

        let counts = self.counts();
        writeln!(out, "\n")?;
        writeln!(out, "This scan consists of: {} groups,", counts.total(ContainerKind::Group))?;
        writeln!(out, "                       {} projects,", counts.total(ContainerKind::Project))?;
        writeln!(out, "                       {} subjects,", counts.total(ContainerKind::Subject))?;
        writeln!(out, "                       {} sessions,", counts.total(ContainerKind::Session))?;
        writeln!(out, "                       {} acquisitions,", counts.total(ContainerKind::Acquisition))?;
        writeln!(out, "                       {} attachments, and", counts.files)?;
        writeln!(out, "                       {} packfiles.", counts.packfiles)?;
        Ok(counts)
    }

    /// Warnings about things that can't be uploaded as planned.
    pub fn verify(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        for (_, id) in self.walk() {
            let node = self.node(id);
            if node.kind.holds_files() {
                continue;
            }
            let name = node.display_name();
            for file in &node.files {
                messages.push(Message::warn(format!(
                    "File {} cannot be uploaded to {} {name} - files are not supported at this level",
                    file_name(file),
                    node.kind
                )));
            }
            for packfile in &node.packfiles {
                messages.push(Message::warn(format!(
                    "{} pack-file cannot be uploaded to {} {name} - files are not supported at this level",
                    packfile.display_name(),
                    node.kind
                )));
            }
        }
        messages
    }

    /// Sorted descending so popping off a stack yields ascending order.
    fn sorted_desc(&self, ids: &[NodeId]) -> Vec<NodeId> {
        let mut ids = ids.to_vec();
        ids.sort_by_cached_key(|id| std::cmp::Reverse(self.node(*id).display_name().to_lowercase()));
        ids
    }
}

fn write_entry(out: &mut dyn Write, level: usize, msg: &str) -> io::Result<()> {
    writeln!(out, "{}{ENTRY}{msg}", SPACER.repeat(level))
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use crate::factory::tests::RecordingResolver;
    use crate::{ContainerFactory, DiscoveryContext, PackfileDescriptor};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn build() -> ContainerFactory {
        let mut factory = ContainerFactory::new(Arc::new(RecordingResolver::default()));
        let mut ctx = DiscoveryContext::default();
        ctx.set("group._id", "scitran").unwrap();
        ctx.set("project.label", "Anxiety Study").unwrap();
        let project = factory.resolve(&ctx, true).unwrap().unwrap();
        factory.node_mut(project).files.push(PathBuf::from("scitran/Anxiety Study/InformedConsent.pdf"));
        for subject in ["beta", "Alpha"] {
            let mut ctx = ctx.clone();
            ctx.set("subject.label", subject).unwrap();
            let node = factory.resolve(&ctx, true).unwrap().unwrap();
            if subject == "beta" {
                factory.node_mut(node).files.push(PathBuf::from("notes.txt"));
            }
        }
        let mut ctx = ctx.clone();
        ctx.set("subject.label", "Alpha").unwrap();
        ctx.set("session.label", "ses1").unwrap();
        let session = factory.resolve(&ctx, true).unwrap().unwrap();
        factory.node_mut(session).packfiles.push(PackfileDescriptor::paths("dicom", vec!["a".into(), "b".into()], None));
        factory
    }

    #[test]
    fn test_print_summary() {
        let factory = build();
        let mut out = Vec::new();
        let counts = factory.print_summary(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let expected = "\
├── scitran (creating)
|   ├── Anxiety Study (creating)
|   |   ├── InformedConsent.pdf
|   |   ├── Alpha (creating)
|   |   |   ├── ses1 (creating)
|   |   |   |   ├── dicom (2 files)
|   |   ├── beta (creating)
|   |   |   ├── notes.txt
";
        assert!(text.starts_with(expected), "{text}");
        assert!(text.contains("This scan consists of: 1 groups,"));
        assert!(text.contains("2 subjects,"));
        assert!(text.contains("1 packfiles."));
        assert_eq!(counts.files, 2);
    }

    #[test]
    fn test_verify_flags_files_on_subjects() {
        let messages = build().verify();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].text,
            "File notes.txt cannot be uploaded to subject beta - files are not supported at this level"
        );
    }
}
