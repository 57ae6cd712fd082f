//! Building packfile archives from walker files.

use crate::consts::REPEATED_UNDERSCORES;
use crate::deid::DeidProfile;
use crate::discover::should_ignore;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use hoist_compress::PackWriter;
use hoist_hierarchy::{PackfileDescriptor, PackfileSource};
use hoist_storage::Walker;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Reduce a label to something safe to use as a file name.
pub(crate) fn str_to_filename(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| match c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-') {
            true => c,
            false => '_',
        })
        .collect();
    let collapsed = REPEATED_UNDERSCORES.replace_all(&replaced, "_");
    collapsed.trim_matches(|c| c == '_' || c == ' ').to_string()
}

/// The uploaded file name of a packfile attached to a container labelled
/// `label`.
pub fn packfile_name(descriptor: &PackfileDescriptor, label: &str) -> String {
    if let Some(name) = &descriptor.name {
        return name.clone();
    }
    let base = str_to_filename(label);
    match descriptor.packfile_type.as_str() {
        "zip" => format!("{base}.zip"),
        packfile_type => format!("{base}.{packfile_type}.zip"),
    }
}

/// Walker paths and the member names they get inside the archive.
fn members(walker: &dyn Walker, source: &PackfileSource) -> Result<Vec<(PathBuf, String)>> {
    match source {
        PackfileSource::Directory(dir) => {
            let files = walker.files(dir).or_raise(|| ErrorKind::Storage)?;
            Ok(files
                .into_iter()
                .filter_map(|file| {
                    let relative = file.path.strip_prefix(dir).unwrap_or(&file.path);
                    // Discovery never counted these, so they stay out of the archive too.
                    if relative.components().any(|c| should_ignore(&c.as_os_str().to_string_lossy())) {
                        tracing::debug!(path = %file.path.display(), "skipping ignored file");
                        return None;
                    }
                    let name = member_name(relative);
                    Some((file.path, name))
                })
                .collect())
        },
        PackfileSource::Paths(paths) => Ok(paths.iter().map(|path| (path.clone(), member_name(path))).collect()),
    }
}

fn member_name(path: &Path) -> String {
    path.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

/// Write every file of `source` into `pack`, returning the number of
/// members written.
///
/// `progress` receives the cumulative number of bytes written after each
/// member.
#[instrument(skip_all, fields(packfile_type = %packfile_type))]
pub fn create_packfile<W: Write + Seek>(
    walker: &dyn Walker,
    pack: &mut PackWriter<W>,
    packfile_type: &str,
    source: &PackfileSource,
    profile: DeidProfile,
    progress: &mut dyn FnMut(u64),
) -> Result<usize> {
    let members = members(walker, source)?;
    tracing::debug!(count = members.len(), "packing");
    if let Some(written) = profile.process_packfile(packfile_type, walker, pack, &members, progress)? {
        return Ok(written);
    }
    let mut total = 0;
    for (path, name) in &members {
        let mut reader = walker.reader(path).or_raise(|| ErrorKind::Storage)?;
        total += pack.add_reader(name, &mut reader).or_raise(|| ErrorKind::Packfile(name.clone()))?;
        progress(total);
    }
    Ok(members.len())
}
