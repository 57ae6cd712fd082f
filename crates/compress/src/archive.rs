//! Expanding zip and tar archives into memory.

use crate::ArchiveFormat;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::{Read, Seek};
use std::path::PathBuf;
use tracing::instrument;
use zip::ZipArchive;

/// One regular file inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Member path, relative to the archive root.
    pub path: PathBuf,
    pub data: Vec<u8>,
    /// Modification time as seconds since the Unix epoch, when the format records it.
    pub modified: Option<i64>,
}

/// Read every regular file of an archive.
///
/// Directory entries are skipped (callers synthesize directories from member
/// paths). Members whose names would escape the archive root are skipped
/// with a warning.
#[instrument(skip(reader), fields(format = %format))]
pub fn read_archive<R: Read + Seek + Send>(format: ArchiveFormat, reader: R) -> Result<Vec<ArchiveEntry>> {
    match format {
        ArchiveFormat::Zip => read_zip(reader),
        ArchiveFormat::Tar(compression) => read_tar(compression.wrap_reader(reader)?),
    }
}

fn read_zip<R: Read + Seek>(reader: R) -> Result<Vec<ArchiveEntry>> {
    let mut archive = ZipArchive::new(reader).or_raise(|| ErrorKind::Archive("unreadable zip".to_string()))?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut member = archive.by_index(index).or_raise(|| ErrorKind::Archive(format!("zip member {index}")))?;
        if member.is_dir() {
            continue;
        }
        let Some(path) = member.enclosed_name() else {
            tracing::warn!(name = member.name(), "Skipping zip member with unsafe path");
            continue;
        };
        let mut data = Vec::with_capacity(member.size() as usize);
        member.read_to_end(&mut data).or_raise(|| ErrorKind::Archive(path.display().to_string()))?;
        entries.push(ArchiveEntry { path, data, modified: None });
    }
    Ok(entries)
}

fn read_tar<R: Read>(reader: R) -> Result<Vec<ArchiveEntry>> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();
    for entry in archive.entries().or_raise(|| ErrorKind::Archive("unreadable tar".to_string()))? {
        let mut entry = entry.or_raise(|| ErrorKind::Archive("tar entry".to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path().or_raise(|| ErrorKind::Archive("tar entry path".to_string()))?.into_owned();
        if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            tracing::warn!(path = %path.display(), "Skipping tar member with unsafe path");
            continue;
        }
        let modified = entry.header().mtime().ok().and_then(|m| i64::try_from(m).ok());
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data).or_raise(|| ErrorKind::Archive(path.display().to_string()))?;
        entries.push(ArchiveEntry { path, data, modified });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Compression, PackLevel, PackWriter};
    use std::io::Cursor;

    fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(1_600_000_000);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_read_zip() {
        let mut pack = PackWriter::new(Cursor::new(Vec::new()), PackLevel::Default);
        pack.add_bytes("ses1/a.dcm", b"first").unwrap();
        pack.add_bytes("ses1/b.dcm", b"second").unwrap();
        let data = pack.finish().unwrap().into_inner();

        let entries = read_archive(ArchiveFormat::Zip, Cursor::new(data)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, PathBuf::from("ses1/a.dcm"));
        assert_eq!(entries[1].data, b"second");
    }

    #[test]
    fn test_read_tar_gz() {
        let tar = tarball(&[("study/one.dcm", b"1"), ("study/two.dcm", b"22")]);
        let gz = crate::ops::encode(Compression::Gzip, &tar);
        let entries = read_archive(ArchiveFormat::Tar(Compression::Gzip), Cursor::new(gz)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].path, PathBuf::from("study/two.dcm"));
        assert_eq!(entries[1].modified, Some(1_600_000_000));
    }

    #[test]
    fn test_garbage_is_an_archive_error() {
        let err = read_archive(ArchiveFormat::Zip, Cursor::new(b"not a zip".to_vec())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Archive(_)));
    }
}
