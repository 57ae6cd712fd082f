//! S3-compatible walker.
//!
//! Treats a bucket (optionally under a key prefix) as a read-only source tree.
//! Keys are split on `/`; "directories" are the common prefixes returned by
//! a delimited listing.
//!
//! # Credentials
//!
//! Credentials are passed explicitly. [`open_walker`](crate::open_walker)
//! takes them from the standard `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`
//! environment variables.

use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::{validate as validate_path, validate_dir};
use crate::walker::{BoxSyncRead, Walker};
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    primitives::DateTime,
};
use exn::ResultExt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::runtime::{Builder, Runtime};

/// S3-compatible walker.
///
/// The SDK is async; every walker call blocks on a private current-thread
/// runtime so discovery and upload workers can stay synchronous.
pub struct S3Walker {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    runtime: Runtime,
}

impl S3Walker {
    /// Create a new S3 walker.
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix (acts as the walker root)
    /// * `region` - AWS region or provider-specific region
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix
            .map(validate_dir)
            .transpose()?
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_string_lossy().into_owned());
        let credentials = Credentials::new(key_id, key_secret, None, None, "hoist-env");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.into()))
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Path-style addressing for S3-compatible services (MinIO, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .or_raise(|| ErrorKind::Backend("could not start S3 runtime".to_string()))?;
        Ok(Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
            bucket: bucket.into(),
            prefix,
            runtime,
        })
    }

    /// Full S3 key for a relative path. The root maps to the bare prefix.
    fn full_key(&self, path: &Path) -> String {
        let path_str = path.to_string_lossy();
        match (&self.prefix, path_str.is_empty()) {
            (Some(prefix), true) => prefix.clone(),
            (Some(prefix), false) => format!("{prefix}/{path_str}"),
            (None, _) => path_str.into_owned(),
        }
    }

    /// Strip the configured prefix from an S3 key.
    fn relative_path(&self, key: &str) -> Result<PathBuf> {
        let relative = match &self.prefix {
            Some(prefix) => key.strip_prefix(prefix.as_str()).and_then(|s| s.strip_prefix('/')).unwrap_or(key),
            None => key,
        };
        validate_path(relative)
    }

    fn parse_datetime(dt: &DateTime) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos()).ok()
    }

    fn dir_prefix(&self, dir: &Path) -> String {
        let key = self.full_key(dir);
        match key.is_empty() {
            true => key,
            false => format!("{key}/"),
        }
    }
}

impl Walker for S3Walker {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<FileInfo>> {
        let dir = validate_dir(path)?;
        let prefix = self.dir_prefix(&dir);
        let mut entries = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .delimiter("/")
                .set_continuation_token(token.take());
            let output = self
                .runtime
                .block_on(request.send())
                .or_raise(|| ErrorKind::Network(format!("list s3://{}/{prefix}", self.bucket)))?;
            for common in output.common_prefixes() {
                if let Some(key) = common.prefix() {
                    entries.push(FileInfo::directory(self.relative_path(key.trim_end_matches('/'))?));
                }
            }
            for object in output.contents() {
                let Some(key) = object.key() else { continue };
                if key.ends_with('/') {
                    continue;
                }
                let size = object.size().unwrap_or(0).max(0) as u64;
                let modified = object.last_modified().and_then(Self::parse_datetime);
                entries.push(FileInfo::file(self.relative_path(key)?, size).with_modified(modified));
            }
            match (output.is_truncated(), output.next_continuation_token()) {
                (Some(true), Some(next)) => token = Some(next.to_string()),
                _ => break,
            }
        }
        if entries.is_empty() && !dir.as_os_str().is_empty() {
            exn::bail!(ErrorKind::NotFound(dir));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, path: &Path) -> Result<FileInfo> {
        let relative = validate_dir(path)?;
        if relative.as_os_str().is_empty() {
            return Ok(FileInfo::directory(relative));
        }
        let key = self.full_key(&relative);
        let head = self.runtime.block_on(self.client.head_object().bucket(&self.bucket).key(&key).send());
        match head {
            Ok(output) => {
                let size = output.content_length().unwrap_or(0).max(0) as u64;
                let modified = output.last_modified().and_then(Self::parse_datetime);
                Ok(FileInfo::file(relative, size).with_modified(modified))
            },
            // Not an object; a non-empty listing makes it a directory.
            Err(_) => match self.list_dir(&relative) {
                Ok(_) => Ok(FileInfo::directory(relative)),
                Err(_) => exn::bail!(ErrorKind::NotFound(relative)),
            },
        }
    }

    fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        let key = self.full_key(&validate_path(path)?);
        let data = self.runtime.block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .or_raise(|| ErrorKind::NotFound(path.to_path_buf()))?;
            let body = output
                .body
                .collect()
                .await
                .or_raise(|| ErrorKind::Network(format!("read s3://{}/{key}", self.bucket)))?;
            Ok::<_, crate::error::Error>(body.into_bytes().to_vec())
        })?;
        Ok(Box::new(Cursor::new(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walker(prefix: Option<&str>) -> S3Walker {
        S3Walker::new("s3", "bucket", prefix.map(String::from), "us-east-1", None, "id", "secret").unwrap()
    }

    #[test]
    fn test_keys_with_prefix() {
        let walker = walker(Some("imports/2024/"));
        assert_eq!(walker.full_key(Path::new("a/b.dcm")), "imports/2024/a/b.dcm");
        assert_eq!(walker.dir_prefix(Path::new("")), "imports/2024/");
        assert_eq!(walker.relative_path("imports/2024/a/b.dcm").unwrap(), PathBuf::from("a/b.dcm"));
    }

    #[test]
    fn test_keys_without_prefix() {
        let walker = walker(None);
        assert_eq!(walker.full_key(Path::new("a/b.dcm")), "a/b.dcm");
        assert_eq!(walker.dir_prefix(Path::new("")), "");
        assert_eq!(walker.dir_prefix(Path::new("a")), "a/");
    }
}
