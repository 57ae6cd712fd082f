use crate::{ArchiveFormat, Compression};
use std::path::Path;

const BZIP2_MAGIC: [u8; 3] = [0x42, 0x5A, 0x68];
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Enough of a stream's head for [`Compression::from_magic_bytes`].
pub(crate) const MAGIC_LEN: usize = BZIP2_MAGIC.len();

impl Compression {
    /// Detect compression format from magic bytes.
    ///
    /// Returns `None` variant if no magic bytes match or if the input
    /// is too short to detect any format.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(&BZIP2_MAGIC) {
            return Compression::Bzip2;
        }
        if bytes.starts_with(&GZIP_MAGIC) {
            return Compression::Gzip;
        }
        Compression::None
    }
}

impl ArchiveFormat {
    /// Detect an archive from its file name.
    ///
    /// Only the name is consulted; a `.gz` that isn't a tarball is a plain
    /// compressed file, not an archive.
    ///
    /// ```
    /// use hoist_compress::{ArchiveFormat, Compression};
    ///
    /// assert_eq!(ArchiveFormat::from_path("scans.zip"), Some(ArchiveFormat::Zip));
    /// assert_eq!(ArchiveFormat::from_path("scans.tgz"), Some(ArchiveFormat::Tar(Compression::Gzip)));
    /// assert_eq!(ArchiveFormat::from_path("image.dcm.gz"), None);
    /// ```
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let name = path.as_ref().file_name()?.to_str()?.to_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if name.ends_with(".tar") {
            Some(ArchiveFormat::Tar(Compression::None))
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::Tar(Compression::Gzip))
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(ArchiveFormat::Tar(Compression::Bzip2))
        } else {
            None
        }
    }
}
