//! The interactive import driver.
//!
//! Discovery fills the container tree, the user confirms what was found,
//! containers are created, and finally every file and packfile is pushed
//! through the work queue until it drains cleanly or the user gives up.

use crate::consts::{PACKFILE_GROUP, UPLOAD_GROUP};
use crate::deid::DeidProfile;
use crate::discover::{DiscoveryOptions, discover};
use crate::error::{ErrorKind, Result};
use crate::packfile::packfile_name;
use crate::scanner::{DicomScanner, ScanOptions, Scanner};
use crate::template::Template;
use crate::upload::{PackfileTask, UploadSource, UploadTask};
use exn::{OptionExt, ResultExt};
use hoist_compress::{ArchiveFormat, PackLevel};
use hoist_hierarchy::{
    ContainerFactory, DiscoveryContext, Message, PackfileSource, ResolverHandle, UploadTarget, UploaderHandle,
};
use hoist_queue::{BoxTask, WorkQueue};
use hoist_storage::{ArchiveWalker, Walker, WalkerHandle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone)]
pub struct ImportOptions {
    pub packfile_jobs: usize,
    /// Upload workers when the uploader supports signed URLs
    pub concurrent_uploads: usize,
    pub level: PackLevel,
    pub profile: DeidProfile,
    /// Re-pack zipped DICOM archives through the de-identification profile
    pub repack: bool,
    pub max_in_memory_upload: u64,
    pub assume_yes: bool,
    pub max_retries: u32,
    pub scan: ScanOptions,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            packfile_jobs: 1,
            concurrent_uploads: 4,
            level: PackLevel::Level(1),
            profile: DeidProfile::None,
            repack: false,
            max_in_memory_upload: 32 * 1024 * 1024,
            assume_yes: false,
            max_retries: 3,
            scan: ScanOptions::default(),
        }
    }
}

/// Whatever talks to the user while an import runs.
pub trait Console {
    /// Ask a yes/no question.
    fn confirm(&mut self, question: &str) -> bool;

    /// The queue is running; `totals` holds the number of tasks per group.
    fn started(&mut self, _queue: Arc<WorkQueue>, _totals: &[(&'static str, usize)]) {}

    /// Stop drawing progress while messages are printed.
    fn suspend(&mut self) {}

    fn resume(&mut self) {}

    fn finished(&mut self) {}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub containers_created: usize,
    pub uploads_completed: usize,
    pub failed: usize,
    /// The user declined the upload
    pub cancelled: bool,
}

pub struct Importer {
    walker: WalkerHandle,
    factory: ContainerFactory,
    uploader: UploaderHandle,
    options: ImportOptions,
    messages: Vec<Message>,
}

impl Importer {
    pub fn new(
        walker: WalkerHandle,
        resolver: ResolverHandle,
        uploader: UploaderHandle,
        options: ImportOptions,
    ) -> Self {
        Self {
            walker,
            factory: ContainerFactory::new(resolver),
            uploader,
            options,
            messages: Vec::new(),
        }
    }

    pub fn factory(&self) -> &ContainerFactory {
        &self.factory
    }

    /// Messages collected by discovery and verification so far.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Discover the source tree with a template.
    pub fn discover_template(&mut self, template: &Template, context: DiscoveryContext, merge: bool) -> Result<()> {
        let options = DiscoveryOptions {
            merge_subject_and_session: merge,
            scan: self.options.scan.clone(),
        };
        let messages = discover(self.walker.as_ref(), &mut self.factory, template, context, &options)?;
        self.messages.extend(messages);
        Ok(())
    }

    /// Discover every DICOM file in the source tree, ignoring its layout.
    pub fn discover_dicom(&mut self, context: DiscoveryContext) -> Result<()> {
        let mut scanner = DicomScanner::new(self.options.scan.clone());
        let messages = scanner.discover(self.walker.as_ref(), &context, &mut self.factory, Path::new(""))?;
        self.messages.extend(messages);
        Ok(())
    }

    /// Add warnings for things that can't be uploaded where they are.
    pub fn verify(&mut self) {
        let messages = self.factory.verify();
        self.messages.extend(messages);
    }

    /// Fail if any session or acquisition UID is already taken.
    pub fn check_uids(&self) -> Result<()> {
        let (count, conflicts) = self.factory.check_container_unique_uids().or_raise(|| ErrorKind::Hierarchy)?;
        tracing::debug!(count, conflicts = conflicts.len(), "checked UIDs");
        if conflicts.is_empty() {
            return Ok(());
        }
        let listing = conflicts
            .into_iter()
            .map(|id| {
                let node = self.factory.node(id);
                format!("{} {} ({})", node.kind, node.display_name(), node.uid.as_deref().unwrap_or_default())
            })
            .collect();
        exn::bail!(ErrorKind::Conflict(listing))
    }

    /// One task per loose file and per packfile.
    ///
    /// Containers must have been created first.
    fn tasks(&self) -> Result<Vec<BoxTask>> {
        let mut tasks: Vec<BoxTask> = Vec::new();
        for (_, id) in self.factory.walk() {
            let node = self.factory.node(id);
            if node.files.is_empty() && node.packfiles.is_empty() {
                continue;
            }
            let target = self
                .factory
                .target(id)
                .ok_or_raise(|| ErrorKind::Upload(node.display_name().to_string()))?;
            for path in &node.files {
                tasks.push(self.file_task(&target, path));
            }
            for descriptor in &node.packfiles {
                tasks.push(Box::new(PackfileTask {
                    uploader: self.uploader.clone(),
                    walker: self.walker.clone(),
                    packfile_type: descriptor.packfile_type.clone(),
                    source: descriptor.source.clone(),
                    profile: self.options.profile,
                    level: self.options.level,
                    target: target.clone(),
                    name: packfile_name(descriptor, node.display_name()),
                    max_in_memory: self.options.max_in_memory_upload,
                }));
            }
        }
        Ok(tasks)
    }

    fn file_task(&self, target: &UploadTarget, path: &Path) -> BoxTask {
        let name = path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
        if self.options.repack
            && let Some(walker) = self.dicom_archive(path)
        {
            tracing::debug!(path = %path.display(), "repacking archive");
            return Box::new(PackfileTask {
                uploader: self.uploader.clone(),
                walker,
                packfile_type: "dicom".to_string(),
                source: PackfileSource::Directory(PathBuf::new()),
                profile: self.options.profile,
                level: self.options.level,
                target: target.clone(),
                name,
                max_in_memory: self.options.max_in_memory_upload,
            });
        }
        Box::new(UploadTask {
            uploader: self.uploader.clone(),
            target: target.clone(),
            name,
            source: UploadSource::Walker {
                walker: self.walker.clone(),
                path: path.to_path_buf(),
            },
            max_in_memory: self.options.max_in_memory_upload,
        })
    }

    /// A walker over `path` if it's a zip archive with DICOM members.
    fn dicom_archive(&self, path: &Path) -> Option<WalkerHandle> {
        if ArchiveFormat::from_path(path) != Some(ArchiveFormat::Zip) {
            return None;
        }
        let archive = match ArchiveWalker::open(self.walker.as_ref(), path) {
            Ok(archive) => archive,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "unable to open archive; uploading as is");
                return None;
            },
        };
        let files = archive.files(Path::new("")).ok()?;
        files
            .iter()
            .any(|file| file.name.to_ascii_lowercase().ends_with(".dcm"))
            .then(|| Arc::new(archive) as WalkerHandle)
    }

    fn upload_jobs(&self) -> usize {
        match self.uploader.supports_signed_url() {
            true => self.options.concurrent_uploads,
            false => 1,
        }
    }

    /// Summarise, confirm, create containers and upload everything.
    #[instrument(skip_all)]
    pub fn run(&mut self, console: &mut dyn Console, out: &mut dyn Write) -> Result<ImportReport> {
        if self.factory.is_empty() {
            writeln!(out, "Nothing found to import!").map_err(ErrorKind::Io)?;
            return Ok(ImportReport::default());
        }
        writeln!(out, "The following data hierarchy was found:\n").map_err(ErrorKind::Io)?;
        let counts = self.factory.print_summary(out).map_err(ErrorKind::Io)?;
        if !self.messages.is_empty() {
            writeln!(out).map_err(ErrorKind::Io)?;
            for message in &self.messages {
                writeln!(out, "{message}").map_err(ErrorKind::Io)?;
            }
        }
        if !self.options.assume_yes && !console.confirm("Confirm upload?") {
            return Ok(ImportReport {
                cancelled: true,
                ..Default::default()
            });
        }

        self.check_uids()?;
        let containers_created = self.factory.create_containers().or_raise(|| ErrorKind::Hierarchy)?;
        tracing::info!(containers_created, "containers created");
        let tasks = self.tasks()?;
        let packfiles = tasks.iter().filter(|task| task.group() == PACKFILE_GROUP).count();
        let totals = [(PACKFILE_GROUP, packfiles), (UPLOAD_GROUP, counts.files + counts.packfiles)];

        let queue = Arc::new(WorkQueue::new([
            (PACKFILE_GROUP, self.options.packfile_jobs),
            (UPLOAD_GROUP, self.upload_jobs()),
        ]));
        queue.start().or_raise(|| ErrorKind::Queue)?;
        console.started(queue.clone(), &totals);
        for task in tasks {
            queue.enqueue(task).or_raise(|| ErrorKind::Queue)?;
        }

        let mut retries = 0;
        loop {
            queue.wait_for_finish();
            if !queue.has_errors() {
                break;
            }
            console.suspend();
            writeln!(out, "The following errors occurred:").map_err(ErrorKind::Io)?;
            for failure in queue.errors() {
                writeln!(out, "  {}: {}", failure.description, failure.message).map_err(ErrorKind::Io)?;
            }
            let retry = match self.options.assume_yes {
                true => retries < self.options.max_retries,
                false => console.confirm("One or more errors occurred. Retry?"),
            };
            if !retry {
                break;
            }
            retries += 1;
            let requeued = queue.requeue_errors();
            tracing::info!(requeued, retries, "retrying failed tasks");
            console.resume();
        }
        console.finished();

        let uploads_completed = queue.stats().get(UPLOAD_GROUP).map_or(0, |stats| stats.completed);
        let failed = queue.errors().len();
        queue.shutdown();
        Ok(ImportReport {
            containers_created,
            uploads_completed,
            failed,
            cancelled: false,
        })
    }
}
