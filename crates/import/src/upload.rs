//! Queue tasks that package and upload files.
//!
//! Tasks open their sources only when executed, so a requeued task starts
//! over from the beginning.

use crate::consts::{PACKFILE_GROUP, UPLOAD_GROUP};
use crate::deid::DeidProfile;
use crate::error::{ErrorKind, Result};
use crate::packfile::create_packfile;
use exn::ResultExt;
use hoist_compress::{PackLevel, PackWriter};
use hoist_hierarchy::{PackfileSource, UploadTarget, UploaderHandle};
use hoist_queue::error::{ErrorKind as QueueErrorKind, Result as QueueResult};
use hoist_queue::{BoxTask, Progress, Task};
use hoist_storage::WalkerHandle;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek};
use std::path::PathBuf;
use tracing::instrument;

/// Where an upload's bytes come from.
pub(crate) enum UploadSource {
    Walker { walker: WalkerHandle, path: PathBuf },
    /// A packfile built by a [`PackfileTask`]
    File(File),
}

/// Reports bytes read through it.
struct Counting<'a, R> {
    inner: R,
    progress: &'a Progress,
}

impl<R: Read> Read for Counting<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.progress.add(read as u64);
        Ok(read)
    }
}

pub(crate) struct UploadTask {
    pub uploader: UploaderHandle,
    pub target: UploadTarget,
    pub name: String,
    pub source: UploadSource,
    /// Sources smaller than this are read into memory first
    pub max_in_memory: u64,
}

impl UploadTask {
    #[instrument(skip_all, fields(name = %self.name, target = %self.target.id))]
    fn upload(&mut self, progress: &Progress) -> Result<()> {
        let (reader, size): (Box<dyn Read + Send + '_>, u64) = match &mut self.source {
            UploadSource::Walker { walker, path } => {
                let size = walker.stat(path).or_raise(|| ErrorKind::Storage)?.size;
                (walker.reader(path).or_raise(|| ErrorKind::Storage)?, size)
            },
            UploadSource::File(file) => {
                file.rewind().map_err(ErrorKind::Io)?;
                let size = file.metadata().map_err(ErrorKind::Io)?.len();
                (Box::new(file), size)
            },
        };
        let mut reader: Box<dyn Read + Send + '_> = match size < self.max_in_memory {
            true => {
                let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
                reader.take(size).read_to_end(&mut data).map_err(ErrorKind::Io)?;
                Box::new(Cursor::new(data))
            },
            false => reader,
        };
        let mut counting = Counting {
            inner: &mut reader,
            progress,
        };
        tracing::debug!(size, "uploading");
        self.uploader
            .upload(&self.target, &self.name, &mut counting, size)
            .or_raise(|| ErrorKind::Upload(self.name.clone()))
    }
}

impl Task for UploadTask {
    fn group(&self) -> &'static str {
        UPLOAD_GROUP
    }

    fn execute(&mut self, progress: &Progress) -> QueueResult<Option<BoxTask>> {
        progress.set(0);
        self.upload(progress).or_raise(|| QueueErrorKind::Task(self.describe()))?;
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("Upload {}", self.name)
    }
}

/// Builds a packfile into a temporary file, then hands it to an
/// [`UploadTask`].
pub(crate) struct PackfileTask {
    pub uploader: UploaderHandle,
    pub walker: WalkerHandle,
    pub packfile_type: String,
    pub source: PackfileSource,
    pub profile: DeidProfile,
    pub level: PackLevel,
    pub target: UploadTarget,
    pub name: String,
    pub max_in_memory: u64,
}

impl PackfileTask {
    #[instrument(skip_all, fields(name = %self.name))]
    fn build(&self, progress: &Progress) -> Result<File> {
        let mut pack = PackWriter::new(tempfile::tempfile().map_err(ErrorKind::Io)?, self.level);
        let count = create_packfile(
            self.walker.as_ref(),
            &mut pack,
            &self.packfile_type,
            &self.source,
            self.profile,
            &mut |bytes| progress.set(bytes),
        )?;
        tracing::debug!(count, "packfile built");
        pack.finish().or_raise(|| ErrorKind::Packfile(self.name.clone()))
    }
}

impl Task for PackfileTask {
    fn group(&self) -> &'static str {
        PACKFILE_GROUP
    }

    fn execute(&mut self, progress: &Progress) -> QueueResult<Option<BoxTask>> {
        progress.set(0);
        let file = self.build(progress).or_raise(|| QueueErrorKind::Task(self.describe()))?;
        Ok(Some(Box::new(UploadTask {
            uploader: self.uploader.clone(),
            target: self.target.clone(),
            name: self.name.clone(),
            source: UploadSource::File(file),
            max_in_memory: self.max_in_memory,
        })))
    }

    fn describe(&self) -> String {
        format!("Pack {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_hierarchy::{ContainerKind, FolderResolver};
    use hoist_storage::MockWalker;
    use rstest::rstest;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn target() -> UploadTarget {
        UploadTarget {
            kind: ContainerKind::Project,
            id: "scitran/Anxiety Study".to_string(),
            label: Some("Anxiety Study".to_string()),
        }
    }

    #[rstest]
    #[case::in_memory(1024)]
    #[case::streamed(0)]
    fn test_upload_walker_file(#[case] max_in_memory: u64) {
        let temp = TempDir::new().unwrap();
        let walker: WalkerHandle = Arc::new(MockWalker::with_files([("consent.pdf", b"signed".to_vec())]));
        let mut task = UploadTask {
            uploader: Arc::new(FolderResolver::new(temp.path()).unwrap()),
            target: target(),
            name: "consent.pdf".to_string(),
            source: UploadSource::Walker {
                walker,
                path: PathBuf::from("consent.pdf"),
            },
            max_in_memory,
        };
        let progress = Progress::default();
        assert!(task.execute(&progress).unwrap().is_none());
        assert_eq!(progress.get(), 6);
        // Retrying starts over.
        task.execute(&progress).unwrap();
        assert_eq!(progress.get(), 6);
        assert_eq!(fs::read(temp.path().join("scitran/Anxiety Study/consent.pdf")).unwrap(), b"signed");
        assert_eq!(task.describe(), "Upload consent.pdf");
    }

    #[test]
    fn test_missing_source_fails() {
        let temp = TempDir::new().unwrap();
        let mut task = UploadTask {
            uploader: Arc::new(FolderResolver::new(temp.path()).unwrap()),
            target: target(),
            name: "gone.txt".to_string(),
            source: UploadSource::Walker {
                walker: Arc::new(MockWalker::with_files([("a.txt", b"a".to_vec())])),
                path: PathBuf::from("gone.txt"),
            },
            max_in_memory: 0,
        };
        let Err(err) = task.execute(&Progress::default()) else {
            panic!("expected the upload to fail");
        };
        assert!(matches!(&*err, QueueErrorKind::Task(desc) if desc == "Upload gone.txt"));
    }

    #[test]
    fn test_packfile_then_upload() {
        let temp = TempDir::new().unwrap();
        let walker: WalkerHandle = Arc::new(MockWalker::with_files([
            ("fMRI/dicom/001.dcm", b"one".to_vec()),
            ("fMRI/dicom/002.dcm", b"two".to_vec()),
        ]));
        let mut task = PackfileTask {
            uploader: Arc::new(FolderResolver::new(temp.path()).unwrap()),
            walker,
            packfile_type: "dicom".to_string(),
            source: PackfileSource::Directory(PathBuf::from("fMRI/dicom")),
            profile: DeidProfile::None,
            level: PackLevel::Level(1),
            target: target(),
            name: "fMRI.dicom.zip".to_string(),
            max_in_memory: 0,
        };
        assert_eq!(task.group(), PACKFILE_GROUP);
        let progress = Progress::default();
        let mut upload = task.execute(&progress).unwrap().unwrap();
        assert_eq!(progress.get(), 6);
        assert_eq!(upload.group(), UPLOAD_GROUP);
        upload.execute(&progress).unwrap();

        let file = File::open(temp.path().join("scitran/Anxiety Study/fMRI.dicom.zip")).unwrap();
        let archive = ZipArchive::new(file).unwrap();
        let mut names: Vec<_> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, ["001.dcm", "002.dcm"]);
    }
}
