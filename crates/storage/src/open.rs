//! Pick a walker for an import source given on the command line.

use crate::WalkerHandle;
use crate::error::{ErrorKind, Result};
use crate::walker::{ArchiveWalker, LocalWalker};
use hoist_compress::ArchiveFormat;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Open a walker for `source`.
///
/// - `s3://bucket/prefix` opens an S3 walker (only with the `s3` feature).
/// - A directory opens a [`LocalWalker`].
/// - A `.zip`, `.tar`, `.tgz`, `.tar.gz` or `.tar.bz2` file is expanded into
///   an [`ArchiveWalker`].
#[instrument(skip_all, fields(source = source))]
pub fn open_walker(source: &str, follow_symlinks: bool) -> Result<WalkerHandle> {
    if let Some(location) = source.strip_prefix("s3://") {
        return open_s3(location);
    }
    let path = Path::new(source);
    if path.is_dir() {
        return Ok(Arc::new(LocalWalker::new("local", path, follow_symlinks)?));
    }
    if path.is_file()
        && let Some(format) = ArchiveFormat::from_path(path)
    {
        let file = File::open(path).map_err(ErrorKind::Io)?;
        return Ok(Arc::new(ArchiveWalker::from_reader(source, format, BufReader::new(file))?));
    }
    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()))
}

#[cfg(feature = "s3")]
fn open_s3(location: &str) -> Result<WalkerHandle> {
    use crate::walker::S3Walker;
    use exn::OptionExt;

    let (bucket, prefix) = match location.split_once('/') {
        Some((bucket, prefix)) => (bucket, Some(prefix.to_string()).filter(|p| !p.is_empty())),
        None => (location, None),
    };
    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
    let key_id = env("AWS_ACCESS_KEY_ID").ok_or_raise(|| ErrorKind::Backend("AWS_ACCESS_KEY_ID is not set".into()))?;
    let key_secret =
        env("AWS_SECRET_ACCESS_KEY").ok_or_raise(|| ErrorKind::Backend("AWS_SECRET_ACCESS_KEY is not set".into()))?;
    let region = env("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string());
    let walker = S3Walker::new("s3", bucket, prefix, region, env("AWS_ENDPOINT_URL"), key_id, key_secret)?;
    Ok(Arc::new(walker))
}

#[cfg(not(feature = "s3"))]
fn open_s3(_location: &str) -> Result<WalkerHandle> {
    exn::bail!(ErrorKind::Backend("S3 sources require the `s3` feature".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_directory_opens_local() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), b"x").unwrap();
        let walker = open_walker(temp.path().to_str().unwrap(), false).unwrap();
        assert_eq!(walker.name(), "local");
        assert_eq!(walker.list_dir(Path::new("")).unwrap().len(), 1);
    }

    #[test]
    fn test_zip_opens_archive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("upload.zip");
        let mut pack = hoist_compress::PackWriter::new(File::create(&path).unwrap(), hoist_compress::PackLevel::Store);
        pack.add_bytes("study/a.txt", b"x").unwrap();
        pack.finish().unwrap();
        let walker = open_walker(path.to_str().unwrap(), false).unwrap();
        assert_eq!(walker.read(Path::new("study/a.txt")).unwrap(), b"x");
    }

    #[test]
    fn test_plain_file_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        std::fs::write(&path, b"x").unwrap();
        let err = open_walker(path.to_str().unwrap(), false).err().unwrap();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }
}
