//! Groups DICOM files into sessions and acquisitions by their UIDs.
//!
//! Sessions are keyed by study instance UID and acquisitions by series
//! instance UID, so files are grouped correctly however the directories
//! they sit in are laid out. With related acquisitions enabled, derived
//! objects that reference another series (registrations, structure sets)
//! are grouped with that primary series instead of their own.

use crate::error::{ErrorKind, Result};
use crate::scanner::{ScanOptions, Scanner};
use exn::ResultExt;
use hoist_compress::Compression;
use hoist_dicom::error::ErrorKind as DicomErrorKind;
use hoist_dicom::{DicomHeader, RelatedSeries, is_dicom_name, read_header, timestamp};
use hoist_hierarchy::{ContainerFactory, ContainerKind, DiscoveryContext, LevelMeta, Message, PackfileDescriptor};
use hoist_storage::{FileInfo, Walker};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

pub type SubjectMapperHandle = Arc<dyn SubjectMapper + Send + Sync>;

/// Supplies pseudonymised subject codes.
pub trait SubjectMapper {
    fn subject_code(&self, header: &DicomHeader) -> Option<String>;
}

struct DicomSession {
    subject: LevelMeta,
    session: LevelMeta,
    /// By primary series instance UID
    acquisitions: BTreeMap<String, DicomAcquisition>,
    /// Files referencing a primary series that hasn't been seen (yet)
    secondary: BTreeMap<String, DicomAcquisition>,
}

#[derive(Default)]
struct DicomAcquisition {
    meta: LevelMeta,
    /// Series instance UID, then SOP instance UID
    files: BTreeMap<String, BTreeMap<String, PathBuf>>,
}

pub struct DicomScanner {
    options: ScanOptions,
    sessions: BTreeMap<String, DicomSession>,
    messages: Vec<Message>,
}

impl DicomScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            sessions: BTreeMap::new(),
            messages: Vec::new(),
        }
    }

    fn report(&mut self, message: Message) {
        tracing::debug!(%message, "file problem");
        self.messages.push(message);
    }

    fn scan_file(&mut self, walker: &dyn Walker, ctx: &DiscoveryContext, file: &FileInfo) {
        let path = &file.path;
        let reader = match open(walker, file) {
            Ok(reader) => reader,
            Err(err) => return self.report(file_error(path, err)),
        };
        let header = match read_header(reader, self.options.related_acquisitions) {
            Ok(header) => header,
            Err(err) if matches!(&*err, DicomErrorKind::NotDicom) => {
                match is_dicom_name(&file.name) {
                    true => self.report(file_error(path, format!("Not a DICOM - {err}"))),
                    false => tracing::debug!(path = %path.display(), "ignoring non-DICOM file"),
                }
                return;
            },
            Err(err) => return self.report(file_error(path, err)),
        };
        let identity = header.sop_uid().and_then(|sop| Ok((sop, header.series_uid()?, header.study_uid()?)));
        let (sop, series, study) = match identity {
            Ok((sop, series, study)) => (sop.to_string(), series.to_string(), study.to_string()),
            Err(err) => return self.report(file_error(path, err)),
        };

        let acquisition = self.acquisition_for(ctx, &header, path, &study, &series);
        let by_sop = acquisition.files.entry(series).or_default();
        let Some(original) = by_sop.get(&sop).cloned() else {
            by_sop.insert(sop, path.clone());
            return;
        };
        match walker.files_equal(path, &original) {
            Ok(true) => tracing::debug!(path = %path.display(), original = %original.display(), "duplicate DICOM"),
            Ok(false) => self.report(Message::error(format!(
                "Error reading file {}: DICOM conflicts with {}! Both files have the same IDs, but contents differ!",
                path.display(),
                original.display()
            ))),
            Err(err) => self.report(file_error(path, err)),
        }
    }

    fn session_for(&mut self, ctx: &DiscoveryContext, header: &DicomHeader, study: &str) -> &mut DicomSession {
        if !self.sessions.contains_key(study) {
            let subject = ctx
                .subject
                .as_ref()
                .and_then(|meta| meta.label.clone())
                .or_else(|| self.options.subject_mapper.as_ref()?.subject_code(header))
                .or_else(|| header.patient_id.clone())
                // Without a patient, keep the whole study under a single subject.
                .unwrap_or_else(|| study.to_string());
            let timestamp = header.study_timestamp();
            let label = ctx
                .session
                .as_ref()
                .and_then(|meta| meta.label.clone())
                .or_else(|| header.study_description.clone())
                .or_else(|| timestamp.map(timestamp::format_label))
                .unwrap_or_else(|| study.to_string());
            let session = DicomSession {
                subject: LevelMeta {
                    label: Some(subject),
                    ..Default::default()
                },
                session: LevelMeta {
                    label: Some(label),
                    uid: Some(study.replace('.', "")),
                    timestamp,
                    ..Default::default()
                },
                acquisitions: BTreeMap::new(),
                secondary: BTreeMap::new(),
            };
            self.sessions.insert(study.to_string(), session);
        }
        self.sessions.get_mut(study).unwrap_or_else(|| unreachable!("session inserted above"))
    }

    /// The acquisition a file belongs to, creating (or promoting) it as
    /// needed.
    fn acquisition_for(
        &mut self,
        ctx: &DiscoveryContext,
        header: &DicomHeader,
        path: &Path,
        study: &str,
        series: &str,
    ) -> &mut DicomAcquisition {
        let (key, primary) = match (&header.related, self.options.related_acquisitions) {
            (RelatedSeries::Series(referenced), true) if referenced != series => (referenced.clone(), false),
            (RelatedSeries::Malformed, true) => {
                tracing::warn!(path = %path.display(), "unable to find related series; uploading into its own acquisition");
                (series.to_string(), true)
            },
            _ => (series.to_string(), true),
        };
        let session = self.session_for(ctx, header, study);
        if session.acquisitions.contains_key(&key) {
            return session.acquisitions.entry(key).or_default();
        }
        if !primary {
            return session.secondary.entry(key.clone()).or_insert_with(|| DicomAcquisition::new(ctx, header, &key));
        }
        let mut acquisition = DicomAcquisition::new(ctx, header, &key);
        if let Some(secondary) = session.secondary.remove(&key) {
            tracing::debug!(series = %key, "merging secondary series into primary");
            acquisition.files = secondary.files;
        }
        session.acquisitions.entry(key).or_insert(acquisition)
    }

    /// Resolve a container for every acquisition and attach one packfile
    /// per series.
    fn finalize(&mut self, ctx: &DiscoveryContext, factory: &mut ContainerFactory) -> Result<()> {
        let sessions = std::mem::take(&mut self.sessions);
        for session in sessions.into_values() {
            let mut session_ctx = ctx.child();
            session_ctx.update_level(ContainerKind::Subject, &session.subject);
            session_ctx.update_level(ContainerKind::Session, &session.session);

            for primary in session.secondary.keys() {
                self.messages.push(Message::warn(format!(
                    "Series {primary} is referenced by other series but was never found; \
                     uploading them into their own acquisition"
                )));
            }
            let acquisitions = session.acquisitions.into_iter().chain(session.secondary);
            for (primary, acquisition) in acquisitions {
                let mut acquisition_ctx = session_ctx.clone();
                acquisition_ctx.update_level(ContainerKind::Acquisition, &acquisition.meta);
                let Some(node) = factory.resolve(&acquisition_ctx, true).or_raise(|| ErrorKind::Hierarchy)? else {
                    self.messages.push(Message::warn(format!(
                        "Ignoring DICOM series {primary} because it represents an ambiguous node"
                    )));
                    continue;
                };
                let label = acquisition.meta.label.clone().unwrap_or_else(|| primary.clone());
                let mut names = BTreeSet::new();
                for (series, files) in acquisition.ordered_files(&primary) {
                    let name = unique_zip_name(&mut names, &label);
                    let paths: Vec<PathBuf> = files.into_values().collect();
                    tracing::debug!(series = %series, count = paths.len(), name = %name, "DICOM packfile");
                    factory.node_mut(node).packfiles.push(PackfileDescriptor::paths("dicom", paths, Some(name)));
                }
            }
        }
        Ok(())
    }
}

impl DicomAcquisition {
    fn new(ctx: &DiscoveryContext, header: &DicomHeader, series: &str) -> Self {
        let timestamp = header.acquisition_timestamp();
        let label = ctx
            .acquisition
            .as_ref()
            .and_then(|meta| meta.label.clone())
            .or_else(|| header.series_description.clone())
            .or_else(|| timestamp.map(timestamp::format_label))
            .unwrap_or_else(|| series.to_string());
        Self {
            meta: LevelMeta {
                label: Some(label),
                uid: Some(series.replace('.', "")),
                timestamp,
                ..Default::default()
            },
            files: BTreeMap::new(),
        }
    }

    /// Files by series, the primary series first.
    fn ordered_files(mut self, primary: &str) -> Vec<(String, BTreeMap<String, PathBuf>)> {
        let mut ordered = Vec::with_capacity(self.files.len());
        if let Some(files) = self.files.remove(primary) {
            ordered.push((primary.to_string(), files));
        }
        ordered.extend(self.files);
        ordered
    }
}

/// `<label>.dicom.zip`, or `<label>_dup-N.dicom.zip` if that's taken.
fn unique_zip_name(taken: &mut BTreeSet<String>, label: &str) -> String {
    let mut name = format!("{label}.dicom.zip");
    let mut duplicate = 1;
    while taken.contains(&name) {
        name = format!("{label}_dup-{duplicate}.dicom.zip");
        duplicate += 1;
    }
    taken.insert(name.clone());
    name
}

/// A reader over the file's contents, decompressing gzip or bzip2 by content.
fn open(walker: &dyn Walker, file: &FileInfo) -> Result<Box<dyn Read + Send>> {
    let reader = walker.reader(&file.path).or_raise(|| ErrorKind::Storage)?;
    Compression::sniff_reader(reader).or_raise(|| ErrorKind::Storage)
}

fn file_error(path: &Path, message: impl std::fmt::Display) -> Message {
    Message::warn(format!("Error reading file {}: {message}", path.display()))
}

impl Scanner for DicomScanner {
    #[instrument(skip_all, fields(prefix = %prefix.display()))]
    fn discover(
        &mut self,
        walker: &dyn Walker,
        ctx: &DiscoveryContext,
        factory: &mut ContainerFactory,
        prefix: &Path,
    ) -> Result<Vec<Message>> {
        let files = walker.files(prefix).or_raise(|| ErrorKind::Storage)?;
        tracing::info!(count = files.len(), "scanning files");
        for (index, file) in files.iter().enumerate() {
            tracing::trace!(index, path = %file.path.display(), "scanning");
            self.scan_file(walker, ctx, file);
        }
        self.finalize(ctx, factory)?;
        Ok(std::mem::take(&mut self.messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::VR;
    use dicom_dictionary_std::tags;
    use flate2::write::GzEncoder;
    use hoist_dicom::testing::{basic, identified, referencing};
    use hoist_hierarchy::{FolderResolver, NodeId, PackfileSource, Severity};
    use hoist_storage::MockWalker;
    use std::io::Write;
    use tempfile::TempDir;

    fn project_context() -> DiscoveryContext {
        let mut ctx = DiscoveryContext::default();
        ctx.set("group._id", "scitran").unwrap();
        ctx.set("project.label", "Anxiety Study").unwrap();
        ctx
    }

    fn scan(files: Vec<(&str, Vec<u8>)>, related: bool) -> (TempDir, ContainerFactory, Vec<Message>) {
        let temp = TempDir::new().unwrap();
        let mut factory = ContainerFactory::new(Arc::new(FolderResolver::new(temp.path()).unwrap()));
        let walker = MockWalker::with_files(files);
        let mut scanner = DicomScanner::new(ScanOptions {
            related_acquisitions: related,
            subject_mapper: None,
        });
        let messages = scanner.discover(&walker, &project_context(), &mut factory, Path::new("")).unwrap();
        (temp, factory, messages)
    }

    fn acquisitions(factory: &ContainerFactory) -> Vec<NodeId> {
        factory
            .walk()
            .into_iter()
            .map(|(_, id)| id)
            .filter(|id| factory.node(*id).kind == ContainerKind::Acquisition)
            .collect()
    }

    fn packfile_paths(factory: &ContainerFactory, id: NodeId) -> Vec<Vec<PathBuf>> {
        factory
            .node(id)
            .packfiles
            .iter()
            .map(|desc| match &desc.source {
                PackfileSource::Paths(paths) => paths.clone(),
                PackfileSource::Directory(_) => panic!("expected explicit paths"),
            })
            .collect()
    }

    #[test]
    fn test_groups_by_study_and_series() {
        let (_temp, factory, messages) = scan(
            vec![
                ("a/1.dcm", basic("1.1", "1.2", "1.3")),
                ("b/2.dcm", basic("1.4", "1.2", "1.3")),
                ("c/3.dcm", basic("1.5", "1.6", "1.3")),
            ],
            false,
        );
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(factory.count(ContainerKind::Subject), 1);
        assert_eq!(factory.count(ContainerKind::Session), 1);
        let acquisitions = acquisitions(&factory);
        assert_eq!(acquisitions.len(), 2);

        let session = factory.node(factory.node(acquisitions[0]).parent.unwrap());
        assert_eq!(session.uid.as_deref(), Some("13"));
        assert_eq!(session.label.as_deref(), Some("2018-04-12 09:30:15"));
        let subject = factory.node(session.parent.unwrap());
        assert_eq!(subject.label.as_deref(), Some("anx_s1"));

        let counts: BTreeSet<usize> =
            acquisitions.iter().map(|id| factory.node(*id).packfiles[0].count).collect();
        assert_eq!(counts, BTreeSet::from([1, 2]));
        let first = factory.node(acquisitions[0]);
        assert_eq!(first.packfiles[0].name.as_deref(), Some("fMRI.dicom.zip"));
    }

    #[test]
    fn test_context_labels_win() {
        let temp = TempDir::new().unwrap();
        let mut factory = ContainerFactory::new(Arc::new(FolderResolver::new(temp.path()).unwrap()));
        let walker = MockWalker::with_files([("1.dcm", basic("1.1", "1.2", "1.3"))]);
        let mut ctx = project_context();
        ctx.set("subject.label", "override").unwrap();
        ctx.set("session.label", "baseline").unwrap();
        DicomScanner::new(ScanOptions::default()).discover(&walker, &ctx, &mut factory, Path::new("")).unwrap();
        let acquisition = factory.node(acquisitions(&factory)[0]);
        let session = factory.node(acquisition.parent.unwrap());
        assert_eq!(session.label.as_deref(), Some("baseline"));
        assert_eq!(factory.node(session.parent.unwrap()).label.as_deref(), Some("override"));
    }

    #[test]
    fn test_labels_fall_back_to_uid() {
        let (_temp, factory, _) = scan(vec![("1.dcm", identified("1.1", "1.2", "1.3", &[]))], false);
        let acquisition = factory.node(acquisitions(&factory)[0]);
        assert_eq!(acquisition.label.as_deref(), Some("1.2"));
        assert_eq!(factory.node(acquisition.parent.unwrap()).label.as_deref(), Some("1.3"));
    }

    #[test]
    fn test_patientless_study_shares_one_subject() {
        let (_temp, factory, messages) = scan(
            vec![
                ("a/1.dcm", identified("1.1", "1.2", "1.3", &[])),
                ("b/2.dcm", identified("1.4", "1.5", "1.3", &[])),
                ("c/3.dcm", identified("1.6", "1.7", "1.3", &[])),
            ],
            false,
        );
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(acquisitions(&factory).len(), 3);
        assert_eq!(factory.count(ContainerKind::Session), 1);
        assert_eq!(factory.count(ContainerKind::Subject), 1);
        let acquisition = factory.node(acquisitions(&factory)[0]);
        let session = factory.node(acquisition.parent.unwrap());
        assert_eq!(factory.node(session.parent.unwrap()).label.as_deref(), Some("1.3"));
    }

    #[test]
    fn test_compressed_files_are_read_by_content() {
        let plain = basic("1.1", "1.2", "1.3");
        let mut gzipped = Vec::new();
        let mut encoder = GzEncoder::new(&mut gzipped, flate2::Compression::default());
        encoder.write_all(&basic("1.4", "1.2", "1.3")).unwrap();
        encoder.finish().unwrap();
        let (_temp, factory, messages) =
            scan(vec![("1.dcm", plain), ("2.dcm.gz", gzipped.clone()), ("3.dcm", gzipped)], false);
        assert!(messages.is_empty(), "{messages:?}");
        let acquisitions = acquisitions(&factory);
        assert_eq!(acquisitions.len(), 1);
        // 3.dcm repeats 2.dcm.gz's SOP instance with identical bytes on disk.
        assert_eq!(factory.node(acquisitions[0]).packfiles[0].count, 2);
    }

    #[test]
    fn test_identical_duplicates_are_kept_once() {
        let data = basic("1.1", "1.2", "1.3");
        let (_temp, factory, messages) = scan(vec![("a/1.dcm", data.clone()), ("b/1.dcm", data)], false);
        assert!(messages.is_empty(), "{messages:?}");
        let acquisition = acquisitions(&factory)[0];
        assert_eq!(factory.node(acquisition).packfiles[0].count, 1);
    }

    #[test]
    fn test_conflicting_duplicates_are_excluded() {
        let changed = identified("1.1", "1.2", "1.3", &[(tags::SERIES_DESCRIPTION, VR::LO, "Changed")]);
        let (_temp, factory, messages) = scan(vec![("a/1.dcm", basic("1.1", "1.2", "1.3")), ("b/1.dcm", changed)], false);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].severity, Severity::Error);
        assert!(messages[0].text.contains("b/1.dcm"), "{}", messages[0].text);
        assert!(messages[0].text.contains("a/1.dcm"), "{}", messages[0].text);
        let acquisition = acquisitions(&factory)[0];
        assert_eq!(packfile_paths(&factory, acquisition), vec![vec![PathBuf::from("a/1.dcm")]]);
    }

    #[rstest::rstest]
    #[case::secondary_first(&["a_secondary.dcm", "b_primary.dcm"])]
    #[case::primary_first(&["a_primary.dcm", "b_secondary.dcm"])]
    fn test_secondary_series_splice(#[case] names: &[&str]) {
        let files = names
            .iter()
            .map(|name| match name.contains("secondary") {
                true => (*name, referencing("2.1", "2.2", "1.3", "1.2")),
                false => (*name, basic("1.1", "1.2", "1.3")),
            })
            .collect();
        let (_temp, factory, messages) = scan(files, true);
        assert!(messages.is_empty(), "{messages:?}");
        let acquisitions = acquisitions(&factory);
        assert_eq!(acquisitions.len(), 1);
        let acquisition = factory.node(acquisitions[0]);
        assert_eq!(acquisition.label.as_deref(), Some("fMRI"));
        assert_eq!(acquisition.uid.as_deref(), Some("12"));
        let names: Vec<_> = acquisition.packfiles.iter().map(|desc| desc.name.clone().unwrap()).collect();
        assert_eq!(names, ["fMRI.dicom.zip", "fMRI_dup-1.dicom.zip"]);
        let paths = packfile_paths(&factory, acquisitions[0]);
        assert_eq!(paths.len(), 2);
        assert!(paths[0][0].display().to_string().contains("primary"));
        assert!(paths[1][0].display().to_string().contains("secondary"));
    }

    #[test]
    fn test_unrelated_when_disabled() {
        let files = vec![
            ("a.dcm", basic("1.1", "1.2", "1.3")),
            ("b.dcm", referencing("2.1", "2.2", "1.3", "1.2")),
        ];
        let (_temp, factory, _) = scan(files, false);
        assert_eq!(acquisitions(&factory).len(), 2);
    }

    #[test]
    fn test_stranded_secondary_is_uploaded_on_its_own() {
        let (_temp, factory, messages) = scan(vec![("b.dcm", referencing("2.1", "2.2", "1.3", "9.9"))], true);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].text.contains("9.9"));
        let acquisitions = acquisitions(&factory);
        assert_eq!(acquisitions.len(), 1);
        assert_eq!(factory.node(acquisitions[0]).uid.as_deref(), Some("99"));
    }

    #[test]
    fn test_unreadable_files() {
        let (_temp, factory, messages) = scan(
            vec![
                ("broken.dcm", b"garbage".to_vec()),
                ("notes.txt", b"just text".to_vec()),
                ("nouid.dcm", dicom_bytes_without_series()),
            ],
            false,
        );
        assert!(factory.is_empty());
        let texts: Vec<_> = messages.iter().map(|m| m.to_string()).collect();
        assert_eq!(texts.len(), 2, "{texts:?}");
        assert!(texts[0].starts_with("WARN - Error reading file broken.dcm: Not a DICOM"), "{texts:?}");
        assert!(texts[1].contains("DICOM is missing"), "{texts:?}");
    }

    fn dicom_bytes_without_series() -> Vec<u8> {
        hoist_dicom::testing::dicom_bytes(
            &[
                (tags::SOP_INSTANCE_UID, VR::UI, "1.1"),
                (tags::STUDY_INSTANCE_UID, VR::UI, "1.3"),
            ],
            vec![],
        )
    }

    #[test]
    fn test_unique_zip_name() {
        let mut taken = BTreeSet::new();
        assert_eq!(unique_zip_name(&mut taken, "T1"), "T1.dicom.zip");
        assert_eq!(unique_zip_name(&mut taken, "T1"), "T1_dup-1.dicom.zip");
        assert_eq!(unique_zip_name(&mut taken, "T1"), "T1_dup-2.dicom.zip");
    }
}
