//! The discovery context record.
//!
//! A [`DiscoveryContext`] accumulates what is known about a point in the
//! hierarchy while discovery descends through directories. It is cloned
//! (never shared) when branching into subdirectories, so metadata picked up
//! in one subtree can't leak into its siblings.

use crate::ContainerKind;
use crate::error::{ErrorKind, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use time::PrimitiveDateTime;

/// What is known about one hierarchy level.
///
/// A level that is *present* but has every field empty is still different
/// from an absent level: it tells the factory the level exists in the path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelMeta {
    /// Remote identifier (`_id`)
    pub id: Option<String>,
    pub label: Option<String>,
    /// Domain identifier (DICOM study/series UID with dots removed)
    pub uid: Option<String>,
    pub timestamp: Option<PrimitiveDateTime>,
    /// Any other `level.field` values from templates or the command line
    pub extra: BTreeMap<String, String>,
}

impl LevelMeta {
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Overlay every field that is set on `other`.
    pub fn update(&mut self, other: &LevelMeta) {
        if other.id.is_some() {
            self.id.clone_from(&other.id);
        }
        if other.label.is_some() {
            self.label.clone_from(&other.label);
        }
        if other.uid.is_some() {
            self.uid.clone_from(&other.uid);
        }
        if other.timestamp.is_some() {
            self.timestamp = other.timestamp;
        }
        self.extra.extend(other.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscoveryContext {
    pub group: Option<LevelMeta>,
    pub project: Option<LevelMeta>,
    pub subject: Option<LevelMeta>,
    pub session: Option<LevelMeta>,
    pub acquisition: Option<LevelMeta>,
    /// Loose files collected in the current directory (never inherited)
    pub files: Vec<PathBuf>,
    /// Packfile type, when this subtree is packaged wholesale
    pub packfile: Option<String>,
    /// Explicit packfile file name
    pub packfile_name: Option<String>,
    /// Index of the packfile descriptor collecting this subtree's files
    pub packfile_desc: Option<usize>,
    /// Skip this subtree entirely
    pub ignore: bool,
    /// Root-level keys that aren't part of the hierarchy
    pub extra: BTreeMap<String, String>,
}

impl DiscoveryContext {
    pub fn level(&self, kind: ContainerKind) -> Option<&LevelMeta> {
        match kind {
            ContainerKind::Group => self.group.as_ref(),
            ContainerKind::Project => self.project.as_ref(),
            ContainerKind::Subject => self.subject.as_ref(),
            ContainerKind::Session => self.session.as_ref(),
            ContainerKind::Acquisition => self.acquisition.as_ref(),
        }
    }

    fn slot(&mut self, kind: ContainerKind) -> &mut Option<LevelMeta> {
        match kind {
            ContainerKind::Group => &mut self.group,
            ContainerKind::Project => &mut self.project,
            ContainerKind::Subject => &mut self.subject,
            ContainerKind::Session => &mut self.session,
            ContainerKind::Acquisition => &mut self.acquisition,
        }
    }

    /// The level's record, creating an empty (but present) one if needed.
    pub fn level_mut(&mut self, kind: ContainerKind) -> &mut LevelMeta {
        self.slot(kind).get_or_insert_with(LevelMeta::default)
    }

    pub fn has(&self, kind: ContainerKind) -> bool {
        self.level(kind).is_some()
    }

    /// Replace a level wholesale.
    pub fn set_level(&mut self, kind: ContainerKind, meta: LevelMeta) {
        *self.slot(kind) = Some(meta);
    }

    /// Overlay `meta` onto a level, making it present.
    pub fn update_level(&mut self, kind: ContainerKind, meta: &LevelMeta) {
        self.level_mut(kind).update(meta);
    }

    /// Set a value by dotted key.
    ///
    /// `level.id`/`level._id`, `level.label` and `level.uid` address the
    /// level fields; any other `level.field` lands in that level's extras.
    /// `packfile`, `packfile_name` and `ignore` address the transient keys.
    ///
    /// ```
    /// use hoist_hierarchy::{ContainerKind, DiscoveryContext};
    ///
    /// let mut ctx = DiscoveryContext::default();
    /// ctx.set("group._id", "scitran").unwrap();
    /// ctx.set("session.label", "ses1").unwrap();
    /// ctx.set("session.operator", "A. Person").unwrap();
    /// assert_eq!(ctx.group.as_ref().unwrap().id.as_deref(), Some("scitran"));
    /// assert_eq!(ctx.session.as_ref().unwrap().extra["operator"], "A. Person");
    /// assert!(!ctx.has(ContainerKind::Project));
    /// assert!(ctx.set("session.", "x").is_err());
    /// ```
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        if let Some((level, field)) = key.split_once('.')
            && let Ok(kind) = level.parse::<ContainerKind>()
        {
            if field.is_empty() {
                exn::bail!(ErrorKind::InvalidContext(key.to_string()));
            }
            let meta = self.level_mut(kind);
            match field {
                "_id" | "id" => meta.id = Some(value),
                "label" => meta.label = Some(value),
                "uid" => meta.uid = Some(value),
                other => {
                    meta.extra.insert(other.to_string(), value);
                },
            }
            return Ok(());
        }
        match key {
            "" => exn::bail!(ErrorKind::InvalidContext(key.to_string())),
            "packfile" => self.packfile = Some(value),
            "packfile_name" => self.packfile_name = Some(value),
            "ignore" => self.ignore = matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
            other => {
                self.extra.insert(other.to_string(), value);
            },
        }
        Ok(())
    }

    /// A copy for a subdirectory: everything but the loose file list.
    pub fn child(&self) -> Self {
        Self {
            files: Vec::new(),
            ..self.clone()
        }
    }

    /// Keep 4-level studies usable with a 5-level hierarchy.
    ///
    /// When exactly one of subject/session is present, the missing one gets
    /// the present one's label. Nothing else (UIDs in particular) is copied.
    /// A session without a subject is checked first.
    pub fn merge_subject_and_session(&mut self) {
        let label = |meta: &Option<LevelMeta>| meta.as_ref().and_then(|m| m.label.clone());
        match (self.subject.is_some(), self.session.is_some()) {
            (false, true) => self.subject = Some(LevelMeta::with_label_opt(label(&self.session))),
            (true, false) => self.session = Some(LevelMeta::with_label_opt(label(&self.subject))),
            _ => {},
        }
    }
}

impl LevelMeta {
    fn with_label_opt(label: Option<String>) -> Self {
        Self {
            label,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("project.label", ContainerKind::Project)]
    #[case("acquisition.label", ContainerKind::Acquisition)]
    fn test_set_label(#[case] key: &str, #[case] kind: ContainerKind) {
        let mut ctx = DiscoveryContext::default();
        ctx.set(key, "value").unwrap();
        assert_eq!(ctx.level(kind).unwrap().label.as_deref(), Some("value"));
        assert!(ContainerKind::ALL.iter().filter(|k| **k != kind).all(|k| !ctx.has(*k)));
    }

    #[rstest]
    #[case("ignore", "true", true)]
    #[case("ignore", "1", true)]
    #[case("ignore", "no", false)]
    fn test_set_ignore(#[case] key: &str, #[case] value: &str, #[case] expected: bool) {
        let mut ctx = DiscoveryContext::default();
        ctx.set(key, value).unwrap();
        assert_eq!(ctx.ignore, expected);
    }

    #[test]
    fn test_set_transient_and_extra() {
        let mut ctx = DiscoveryContext::default();
        ctx.set("packfile", "dicom").unwrap();
        ctx.set("packfile_name", "scan.zip").unwrap();
        ctx.set("operator", "x").unwrap();
        assert_eq!(ctx.packfile.as_deref(), Some("dicom"));
        assert_eq!(ctx.packfile_name.as_deref(), Some("scan.zip"));
        assert_eq!(ctx.extra["operator"], "x");
    }

    #[test]
    fn test_child_drops_files() {
        let mut ctx = DiscoveryContext::default();
        ctx.set("group._id", "g").unwrap();
        ctx.files.push(PathBuf::from("a.txt"));
        let child = ctx.child();
        assert!(child.files.is_empty());
        assert_eq!(child.group, ctx.group);
    }

    #[test]
    fn test_merge_session_into_subject() {
        let mut ctx = DiscoveryContext::default();
        ctx.session = Some(LevelMeta {
            label: Some("ses1".into()),
            uid: Some("123".into()),
            ..Default::default()
        });
        ctx.merge_subject_and_session();
        let subject = ctx.subject.unwrap();
        assert_eq!(subject.label.as_deref(), Some("ses1"));
        assert!(subject.uid.is_none());
    }

    #[test]
    fn test_merge_subject_into_session() {
        let mut ctx = DiscoveryContext::default();
        ctx.subject = Some(LevelMeta::with_label("s1"));
        ctx.merge_subject_and_session();
        assert_eq!(ctx.session.unwrap().label.as_deref(), Some("s1"));
    }

    #[test]
    fn test_update_overlays_present_fields() {
        let mut meta = LevelMeta::with_label("old");
        meta.uid = Some("1".into());
        meta.update(&LevelMeta::with_label("new"));
        assert_eq!(meta.label.as_deref(), Some("new"));
        assert_eq!(meta.uid.as_deref(), Some("1"));
    }
}
