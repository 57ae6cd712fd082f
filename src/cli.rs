//! Command-line arguments.

use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::Serialized;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "hoist", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Import data into the container hierarchy
    #[command(subcommand)]
    Import(ImportCommand),
}

#[derive(Debug, Subcommand)]
pub enum ImportCommand {
    /// Import a structured folder
    Folder(FolderArgs),
    /// Import a folder, using a template
    Template(TemplateArgs),
    /// Import a folder of DICOM files, grouped by their UIDs
    Dicom(DicomArgs),
}

/// Options shared by every command; they override the configuration file.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, env = "HOIST_CONFIG")]
    pub config: Option<PathBuf>,
    /// Answer yes to every prompt
    #[arg(short = 'y', long = "yes", global = true)]
    pub assume_yes: bool,
    /// Packaging workers (-1 for half the CPUs)
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub jobs: Option<i32>,
    #[arg(long, global = true)]
    pub concurrent_uploads: Option<usize>,
    /// Zip deflate level: -1 default, 0 store, 1-9
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub compression_level: Option<i32>,
    /// Follow symbolic links that resolve to directories
    #[arg(long, global = true)]
    pub symlinks: bool,
    /// Folder standing in for the remote store
    #[arg(long, global = true)]
    pub output_folder: Option<PathBuf>,
    /// Group secondary DICOM series with the series they reference
    #[arg(long, global = true)]
    pub related_acquisitions: bool,
    /// De-identify DICOM files before upload (the "minimal" profile)
    #[arg(long, global = true, conflicts_with = "profile")]
    pub de_identify: bool,
    /// De-identification profile
    #[arg(long, global = true)]
    pub profile: Option<String>,
    /// Re-pack zipped DICOM archives through the de-identification profile
    #[arg(long, global = true)]
    pub repack: bool,
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub debug: bool,
    #[arg(long, short, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

impl GlobalArgs {
    /// Layer the flags that were given on top of `figment`.
    pub fn merge_into(&self, mut figment: Figment) -> Figment {
        fn set<T: serde::Serialize>(figment: Figment, key: &str, value: T) -> Figment {
            figment.merge(Serialized::default(key, value))
        }
        if self.assume_yes {
            figment = set(figment, "assume_yes", true);
        }
        if let Some(jobs) = self.jobs {
            figment = set(figment, "jobs", jobs);
        }
        if let Some(uploads) = self.concurrent_uploads {
            figment = set(figment, "concurrent_uploads", uploads);
        }
        if let Some(level) = self.compression_level {
            figment = set(figment, "compression_level", level);
        }
        if self.symlinks {
            figment = set(figment, "follow_symlinks", true);
        }
        if let Some(folder) = &self.output_folder {
            figment = set(figment, "output_folder", folder);
        }
        if self.related_acquisitions {
            figment = set(figment, "related_acquisitions", true);
        }
        if self.de_identify {
            figment = set(figment, "deid_profile", "minimal");
        }
        if let Some(profile) = &self.profile {
            figment = set(figment, "deid_profile", profile);
        }
        figment
    }
}

/// Group and project given up front instead of as directory levels.
#[derive(Debug, Args)]
pub struct ProjectArgs {
    /// The id of the group, if not in the folder structure
    #[arg(long, short)]
    pub group: Option<String>,
    /// The label of the project, if not in the folder structure
    #[arg(long, short, requires = "group")]
    pub project: Option<String>,
}

#[derive(Debug, Args)]
pub struct LevelArgs {
    /// No subject level (create a subject for every session)
    #[arg(long, conflicts_with = "no_sessions")]
    pub no_subjects: bool,
    /// No session level (create a session for every subject)
    #[arg(long)]
    pub no_sessions: bool,
}

#[derive(Debug, Args)]
pub struct FolderArgs {
    /// The folder (or archive, or s3:// location) to import
    pub folder: String,
    #[command(flatten)]
    pub project: ProjectArgs,
    #[command(flatten)]
    pub levels: LevelArgs,
    /// The name of DICOM subfolders to be zipped prior to upload
    #[arg(long, default_value = "dicom", conflicts_with = "pack_acquisitions")]
    pub dicom: String,
    /// Acquisition folders only contain data of this type and are zipped
    #[arg(long, value_name = "TYPE")]
    pub pack_acquisitions: Option<String>,
    /// The number of directories to discard before matching
    #[arg(long, default_value_t = 0)]
    pub root_dirs: usize,
}

#[derive(Debug, Args)]
pub struct TemplateArgs {
    /// The template string
    pub template: String,
    /// The folder (or archive, or s3:// location) to import
    pub folder: String,
    #[command(flatten)]
    pub project: ProjectArgs,
    #[command(flatten)]
    pub levels: LevelArgs,
    /// Set arbitrary context values
    #[arg(long = "set-var", short = 's', value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub set_var: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct DicomArgs {
    /// The folder (or archive, or s3:// location) to import
    pub folder: String,
    /// The id of the group
    pub group: String,
    /// The label of the project
    pub project: String,
    /// Override the subject label
    #[arg(long)]
    pub subject: Option<String>,
    /// Override the session label
    #[arg(long)]
    pub session: Option<String>,
}

fn parse_key_value(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {value:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use hoist_config::Config;
    use rstest::rstest;

    #[test]
    fn test_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case("a=b", Some(("a", "b")))]
    #[case("session.label=x=y", Some(("session.label", "x=y")))]
    #[case("=b", None)]
    #[case("novalue", None)]
    fn test_parse_key_value(#[case] value: &str, #[case] expected: Option<(&str, &str)>) {
        let parsed = parse_key_value(value).ok();
        assert_eq!(parsed, expected.map(|(k, v)| (k.to_string(), v.to_string())));
    }

    #[test]
    fn test_folder_command() {
        let cli = Cli::parse_from([
            "hoist", "import", "folder", "data", "-g", "scitran", "--no-sessions", "--root-dirs", "2", "-y",
        ]);
        let Command::Import(ImportCommand::Folder(args)) = cli.command else {
            panic!("expected folder import");
        };
        assert_eq!(args.folder, "data");
        assert_eq!(args.project.group.as_deref(), Some("scitran"));
        assert!(args.levels.no_sessions);
        assert_eq!(args.root_dirs, 2);
        assert_eq!(args.dicom, "dicom");
        assert!(cli.global.assume_yes);
    }

    #[rstest]
    #[case(&["hoist", "import", "folder", "data", "-p", "proj"])]
    #[case(&["hoist", "import", "folder", "data", "--no-subjects", "--no-sessions"])]
    #[case(&["hoist", "import", "folder", "data", "--dicom", "x", "--pack-acquisitions", "bruker"])]
    #[case(&["hoist", "import", "dicom", "data", "scitran"])]
    fn test_invalid_arguments(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "hoist",
            "--jobs",
            "-1",
            "--compression-level",
            "0",
            "--de-identify",
            "--output-folder",
            "/tmp/out",
            "import",
            "template",
            "{group}",
            "data",
        ]);
        let config = Config::from_figment(cli.global.merge_into(Config::defaults())).unwrap();
        assert_eq!(config.jobs, -1);
        assert_eq!(config.compression_level, 0);
        assert_eq!(config.deid_profile, "minimal");
        assert_eq!(config.output_folder, Some(PathBuf::from("/tmp/out")));
        assert!(!config.assume_yes);
    }
}
