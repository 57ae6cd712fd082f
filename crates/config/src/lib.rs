//! Layered configuration.
//!
//! Values are merged, last one wins, from:
//!
//! 1. built-in defaults;
//! 2. the user's `config.toml` / `config.yaml` in the platform config
//!    directory (`~/.config/hoist` on Linux);
//! 3. an explicit file passed with `--config`;
//! 4. `HOIST_*` environment variables;
//! 5. whatever the caller merges on top (command-line flags).
//!
//! ```
//! use hoist_config::Config;
//! use figment::providers::Serialized;
//!
//! let figment = Config::defaults().merge(Serialized::default("concurrent_uploads", 8));
//! let config = Config::from_figment(figment).unwrap();
//! assert_eq!(config.concurrent_uploads, 8);
//! assert_eq!(config.compression_level, 1);
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use hoist_compress::PackLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "HOIST_";
const MIB: u64 = 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Packaging workers; `-1` means half the available CPUs
    pub jobs: i32,
    /// Upload workers when the uploader supports signed URLs
    pub concurrent_uploads: usize,
    /// Zip deflate level: `-1` library default, `0` store, `1..=9`
    pub compression_level: i32,
    pub follow_symlinks: bool,
    pub buffer_size: usize,
    /// Answer yes to every prompt
    pub assume_yes: bool,
    /// Automatic retry batches when `assume_yes` is set
    pub max_retries: u32,
    /// Link secondary DICOM series to the series they reference
    pub related_acquisitions: bool,
    pub deid_profile: String,
    pub output_folder: Option<PathBuf>,
    /// Uploads smaller than this are read into memory first
    pub max_in_memory_upload: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jobs: -1,
            concurrent_uploads: 4,
            compression_level: 1,
            follow_symlinks: false,
            buffer_size: 65536,
            assume_yes: false,
            max_retries: 3,
            related_acquisitions: false,
            deid_profile: "none".to_string(),
            output_folder: None,
            max_in_memory_upload: 32 * MIB,
        }
    }
}

impl Config {
    /// Just the built-in defaults.
    pub fn defaults() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    /// Every source except command-line overrides.
    pub fn figment(file: Option<&Path>) -> Figment {
        let user = ProjectDirs::from("", "", "hoist").map(|dirs| dirs.config_dir().to_path_buf());
        Self::layered(user.as_deref(), file)
    }

    fn layered(user_dir: Option<&Path>, file: Option<&Path>) -> Figment {
        let mut figment = Self::defaults();
        if let Some(dir) = user_dir {
            tracing::trace!(dir = %dir.display(), "user configuration directory");
            figment = figment.merge(Toml::file(dir.join("config.toml"))).merge(Yaml::file(dir.join("config.yaml")));
        }
        if let Some(file) = file {
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(file)),
                Some("json") => figment.merge(Json::file_exact(file)),
                _ => figment.merge(Toml::file_exact(file)),
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load from every source except command-line overrides.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(file))
    }

    /// Extract and validate.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().map_err(ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(-1..=9).contains(&self.compression_level) {
            exn::bail!(ErrorKind::Invalid("compression_level"));
        }
        if self.concurrent_uploads == 0 {
            exn::bail!(ErrorKind::Invalid("concurrent_uploads"));
        }
        if self.jobs == 0 || self.jobs < -1 {
            exn::bail!(ErrorKind::Invalid("jobs"));
        }
        if self.buffer_size == 0 {
            exn::bail!(ErrorKind::Invalid("buffer_size"));
        }
        Ok(())
    }

    /// Packaging pool size.
    pub fn cpu_jobs(&self) -> usize {
        match usize::try_from(self.jobs) {
            Ok(jobs) if jobs > 0 => jobs,
            _ => {
                let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
                (cpus / 2).max(1)
            },
        }
    }

    /// Upload pool size for an uploader with (or without) signed URL support.
    pub fn upload_jobs(&self, signed_urls: bool) -> usize {
        match signed_urls {
            true => self.concurrent_uploads,
            false => 1,
        }
    }

    pub fn pack_level(&self) -> Result<PackLevel> {
        PackLevel::from_zlib(self.compression_level).or_raise(|| ErrorKind::Invalid("compression_level"))
    }
}
