//! Path validation.
//!
//! Every walker path is relative to the walker's root and must never climb
//! out of it.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a file path relative to a walker root.
///
/// Rejects `..` components that would leave the root, null bytes and paths
/// that normalize to nothing.
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use hoist_storage::validate_path;
/// assert!(validate_path("scitran/Anxiety Study/ses1/001.dcm").is_ok());
/// assert!(validate_path("a/../file.dcm").is_ok()); // (never leaves the root)
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert!(validate_path("").is_err());
/// assert_eq!(
///     validate_path("wrong/.././correct//./scan.dcm/").unwrap(),
///     Path::new("correct/scan.dcm")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let normalized = normalize(path.as_ref())?;
    match normalized.as_os_str().is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(normalized),
    }
}

/// Validates a directory path relative to a walker root.
///
/// Same rules as [`validate`], except that the root itself (an empty path,
/// `.` or `/`) is allowed and comes back as an empty [`PathBuf`].
///
/// ```
/// use hoist_storage::validate_dir;
/// assert_eq!(validate_dir("").unwrap().as_os_str(), "");
/// assert_eq!(validate_dir("/").unwrap().as_os_str(), "");
/// assert!(validate_dir("..").is_err());
/// ```
pub fn validate_dir(path: impl AsRef<Path>) -> Result<PathBuf> {
    normalize(path.as_ref())
}

fn normalize(path: &Path) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
            },
        }
    }
    Ok(components.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("scitran/study/a.dcm", "scitran/study/a.dcm")]
    #[case("a//b//c", "a/b/c")]
    #[case("a/./b/./c", "a/b/c")]
    #[case("a/b/..", "a")]
    #[case("/rooted/file", "rooted/file")]
    #[case("session/", "session")]
    fn test_normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), Path::new(expected));
        assert_eq!(validate_dir(input).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("../etc/passwd")]
    #[case("a/../../b")]
    #[case("..")]
    #[case("a\0b")]
    fn test_rejects_escapes(#[case] input: &str) {
        assert!(validate(input).is_err());
        assert!(validate_dir(input).is_err());
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("./.")]
    #[case("//")]
    fn test_root_only_valid_for_directories(#[case] input: &str) {
        assert!(validate(input).is_err());
        assert_eq!(validate_dir(input).unwrap(), PathBuf::new());
    }
}
