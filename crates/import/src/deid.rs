//! De-identification profiles applied while packfiles are built.

use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use hoist_compress::PackWriter;
use hoist_dicom::deidentify_minimal;
use hoist_dicom::error::ErrorKind as DicomErrorKind;
use hoist_storage::Walker;
use std::collections::HashSet;
use std::io::{Seek, Write};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::instrument;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeidProfile {
    /// Files are packed as they are
    #[default]
    None,
    /// Strip direct patient identifiers from DICOM packfiles
    Minimal,
}

impl FromStr for DeidProfile {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "minimal" => Ok(Self::Minimal),
            other => exn::bail!(ErrorKind::UnknownProfile(other.to_string())),
        }
    }
}

/// What to do with one member after the profile has looked at it.
#[derive(Debug, PartialEq, Eq)]
enum Decision {
    Write { name: String, data: Vec<u8> },
    /// The profile doesn't apply; keep the bytes as they are
    Original,
    Skip,
}

impl DeidProfile {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minimal => "minimal",
        }
    }

    /// Pack `members` (walker path and member name) through the profile.
    ///
    /// Returns `None` when the profile doesn't handle this packfile type and
    /// the caller should copy the files through unchanged.
    #[instrument(skip_all, fields(profile = self.name(), packfile_type = %packfile_type))]
    pub(crate) fn process_packfile<W: Write + Seek>(
        &self,
        packfile_type: &str,
        walker: &dyn Walker,
        pack: &mut PackWriter<W>,
        members: &[(PathBuf, String)],
        progress: &mut dyn FnMut(u64),
    ) -> Result<Option<usize>> {
        if *self == Self::None || packfile_type != "dicom" {
            return Ok(None);
        }
        let mut seen = HashSet::new();
        let mut written = 0;
        let mut total = 0;
        for (path, member) in members {
            let data = walker.read(path).or_raise(|| ErrorKind::Storage)?;
            let bytes = match self.process(&data, &mut seen)? {
                Decision::Write { name, data } => pack.add_bytes(&name, &data),
                Decision::Original => pack.add_bytes(member, &data),
                Decision::Skip => {
                    tracing::warn!(path = %path.display(), "skipping repeated SOP instance");
                    continue;
                },
            };
            total += bytes.or_raise(|| ErrorKind::Packfile(member.clone()))?;
            written += 1;
            progress(total);
        }
        Ok(Some(written))
    }

    fn process(&self, data: &[u8], seen: &mut HashSet<String>) -> Result<Decision> {
        match deidentify_minimal(data) {
            Ok(deidentified) => match seen.insert(deidentified.sop_instance_uid) {
                true => Ok(Decision::Write {
                    name: deidentified.name,
                    data: deidentified.data,
                }),
                false => Ok(Decision::Skip),
            },
            Err(err) if matches!(&*err, DicomErrorKind::NotDicom) => Ok(Decision::Original),
            Err(err) => Err(err).or_raise(|| ErrorKind::Dicom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_compress::PackLevel;
    use hoist_dicom::testing::basic;
    use hoist_storage::MockWalker;
    use std::io::{Cursor, Read};
    use zip::ZipArchive;

    #[test]
    fn test_parse() {
        assert_eq!("minimal".parse::<DeidProfile>().unwrap(), DeidProfile::Minimal);
        assert_eq!("none".parse::<DeidProfile>().unwrap(), DeidProfile::None);
        let err = "strict".parse::<DeidProfile>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownProfile(name) if name == "strict"));
    }

    #[test]
    fn test_none_declines() {
        let walker = MockWalker::with_files([("a.dcm", basic("1.1", "1.2", "1.3"))]);
        let mut pack = PackWriter::new(Cursor::new(Vec::new()), PackLevel::Store);
        let members = [(PathBuf::from("a.dcm"), "a.dcm".to_string())];
        let handled = DeidProfile::None.process_packfile("dicom", &walker, &mut pack, &members, &mut |_| {}).unwrap();
        assert_eq!(handled, None);
        let handled = DeidProfile::Minimal.process_packfile("zip", &walker, &mut pack, &members, &mut |_| {}).unwrap();
        assert_eq!(handled, None);
        assert_eq!(pack.members(), 0);
    }

    #[test]
    fn test_minimal_renames_and_skips_repeats() {
        let walker = MockWalker::with_files([
            ("a.dcm", basic("1.1", "1.2", "1.3")),
            ("b.dcm", basic("1.1", "1.2", "1.3")),
            ("notes.txt", b"not dicom".to_vec()),
        ]);
        let members: Vec<_> =
            ["a.dcm", "b.dcm", "notes.txt"].iter().map(|name| (PathBuf::from(name), name.to_string())).collect();
        let mut pack = PackWriter::new(Cursor::new(Vec::new()), PackLevel::Store);
        let mut reported = Vec::new();
        let written = DeidProfile::Minimal
            .process_packfile("dicom", &walker, &mut pack, &members, &mut |bytes| reported.push(bytes))
            .unwrap();
        assert_eq!(written, Some(2));
        assert_eq!(reported.len(), 2);
        assert!(reported[0] < reported[1]);

        let mut archive = ZipArchive::new(pack.finish().unwrap()).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, ["MR.1.1.dcm", "notes.txt"]);
        let mut text = String::new();
        archive.by_name("notes.txt").unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "not dicom");
    }
}
