//! The fixed `group/project/subject/session/acquisition` folder layout.

use crate::error::Result;
use crate::template::{NodeSpec, Template, TemplateBuilder};

/// Options that shape the folder layout template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderLayout {
    /// Leading directories to skip before the hierarchy starts
    pub root_dirs: usize,
    /// The group is given up front rather than being a directory level
    pub group_pinned: bool,
    pub project_pinned: bool,
    pub no_subjects: bool,
    pub no_sessions: bool,
    /// Name of the acquisition subfolders that hold DICOM files
    pub dicom: String,
    /// Acquisition folders are whole packfiles of this type
    pub pack_acquisitions: Option<String>,
}

impl Default for FolderLayout {
    fn default() -> Self {
        Self {
            root_dirs: 0,
            group_pinned: false,
            project_pinned: false,
            no_subjects: false,
            no_sessions: false,
            dicom: "dicom".to_string(),
            pack_acquisitions: None,
        }
    }
}

impl FolderLayout {
    /// Levels are merged when one of subject/session is missing.
    pub fn merges_subject_and_session(&self) -> bool {
        self.no_subjects || self.no_sessions
    }

    /// The directory levels, for display.
    pub fn describe(&self) -> String {
        let mut levels: Vec<String> = std::iter::repeat_n("*".to_string(), self.root_dirs).collect();
        levels.extend(self.metavars().iter().map(|key| format!("{{{key}}}")));
        match &self.pack_acquisitions {
            Some(packfile_type) => {
                if let Some(last) = levels.last_mut() {
                    last.push_str(&format!(" ({packfile_type})"));
                }
            },
            None => levels.push(self.dicom.clone()),
        }
        levels.join("/")
    }

    fn metavars(&self) -> Vec<&'static str> {
        [
            (!self.group_pinned).then_some("group"),
            (!self.project_pinned).then_some("project"),
            (!self.no_subjects).then_some("subject"),
            (!self.no_sessions).then_some("session"),
            Some("acquisition"),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn template(&self) -> Result<Template> {
        let mut builder = TemplateBuilder::default();
        for _ in 0..self.root_dirs {
            builder = builder.add_node(NodeSpec::any());
        }
        for key in self.metavars() {
            let mut spec = NodeSpec::metavar(key);
            if key == "acquisition"
                && let Some(packfile_type) = &self.pack_acquisitions
            {
                spec = spec.packfile(packfile_type.clone());
            }
            builder = builder.add_node(spec);
        }
        if self.pack_acquisitions.is_none() {
            builder = builder.add_node(NodeSpec::literal(self.dicom.clone()).packfile("dicom"));
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_hierarchy::{ContainerKind, DiscoveryContext};

    fn walk(template: &Template, names: &[&str]) -> (DiscoveryContext, bool) {
        let mut ctx = DiscoveryContext::default();
        let mut node = Some(template.root().clone());
        for name in names {
            node = node.unwrap().extract_metadata(name, &mut ctx).unwrap();
        }
        (ctx, node.is_some_and(|node| node.is_terminal()))
    }

    #[test]
    fn test_default_layout() {
        let layout = FolderLayout::default();
        assert_eq!(layout.describe(), "{group}/{project}/{subject}/{session}/{acquisition}/dicom");
        let (ctx, terminal) =
            walk(&layout.template().unwrap(), &["scitran", "Anxiety Study", "anx_s1", "ses1", "fMRI", "dicom"]);
        assert!(terminal);
        assert_eq!(ctx.packfile.as_deref(), Some("dicom"));
        assert_eq!(ctx.group.unwrap().id.as_deref(), Some("scitran"));
        assert_eq!(ctx.acquisition.unwrap().label.as_deref(), Some("fMRI"));
    }

    #[test]
    fn test_pinned_and_skipped_levels() {
        let layout = FolderLayout {
            root_dirs: 1,
            group_pinned: true,
            project_pinned: true,
            no_sessions: true,
            pack_acquisitions: Some("bruker".to_string()),
            ..Default::default()
        };
        assert!(layout.merges_subject_and_session());
        assert_eq!(layout.describe(), "*/{subject}/{acquisition} (bruker)");
        let (ctx, terminal) = walk(&layout.template().unwrap(), &["export", "s1", "scan"]);
        assert!(terminal);
        assert_eq!(ctx.packfile.as_deref(), Some("bruker"));
        assert!(!ctx.has(ContainerKind::Group));
        assert!(!ctx.has(ContainerKind::Session));
        assert_eq!(ctx.subject.unwrap().label.as_deref(), Some("s1"));
    }
}
