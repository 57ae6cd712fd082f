mod cli;
mod error;
mod logging;
mod progress;
mod prompt;

use crate::cli::{Cli, Command, DicomArgs, FolderArgs, ImportCommand, ProjectArgs, TemplateArgs};
use crate::error::{ErrorKind, Result};
use crate::progress::ProgressConsole;
use clap::Parser;
use exn::{OptionExt, ResultExt};
use hoist_config::Config;
use hoist_hierarchy::{DiscoveryContext, FolderResolver};
use hoist_import::scanner::ScanOptions;
use hoist_import::template::Template;
use hoist_import::{DeidProfile, FolderLayout, ImportOptions, ImportReport, Importer};
use hoist_storage::open_walker;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = match logging::init(cli.global.debug, cli.global.quiet, cli.global.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:?}");
            return ExitCode::FAILURE;
        },
    };
    if let Err(err) = ctrlc::set_handler(|| {
        eprintln!("Interrupted");
        std::process::exit(130);
    }) {
        tracing::warn!(error = %err, "could not install the interrupt handler");
    }

    match run(cli) {
        Ok(report) if report.failed == 0 => ExitCode::SUCCESS,
        Ok(report) => {
            tracing::error!(failed = report.failed, cancelled = report.cancelled, "import incomplete");
            ExitCode::FAILURE
        },
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

fn run(cli: Cli) -> Result<ImportReport> {
    let figment = cli.global.merge_into(Config::figment(cli.global.config.as_deref()));
    let config = Config::from_figment(figment).or_raise(|| ErrorKind::Config)?;
    tracing::debug!(?config, "configuration loaded");

    let Command::Import(command) = cli.command;
    let folder = match &command {
        ImportCommand::Folder(args) => &args.folder,
        ImportCommand::Template(args) => &args.folder,
        ImportCommand::Dicom(args) => &args.folder,
    };

    let output = config
        .output_folder
        .as_deref()
        .ok_or_raise(|| ErrorKind::Usage("an output folder is required (--output-folder)".to_string()))?;
    let resolver = Arc::new(FolderResolver::new(output).or_raise(|| ErrorKind::Output)?);
    let walker = open_walker(folder, config.follow_symlinks).or_raise(|| ErrorKind::Source(folder.clone()))?;

    let options = ImportOptions {
        packfile_jobs: config.cpu_jobs(),
        concurrent_uploads: config.concurrent_uploads,
        level: config.pack_level().or_raise(|| ErrorKind::Config)?,
        profile: config.deid_profile.parse::<DeidProfile>().or_raise(|| ErrorKind::Config)?,
        repack: cli.global.repack,
        max_in_memory_upload: config.max_in_memory_upload,
        assume_yes: config.assume_yes,
        max_retries: config.max_retries,
        scan: ScanOptions {
            related_acquisitions: config.related_acquisitions,
            subject_mapper: None,
        },
    };
    let mut importer = Importer::new(walker.clone(), resolver.clone(), resolver, options);

    match &command {
        ImportCommand::Folder(args) => import_folder(&mut importer, args)?,
        ImportCommand::Template(args) => import_template(&mut importer, args)?,
        ImportCommand::Dicom(args) => import_dicom(&mut importer, args)?,
    }
    importer.verify();

    let mut console = ProgressConsole::new(cli.global.quiet);
    let report = importer.run(&mut console, &mut io::stdout().lock()).or_raise(|| ErrorKind::Import)?;
    if let Err(err) = walker.close() {
        tracing::warn!(error = ?err, "could not close the import source");
    }
    Ok(report)
}

fn project_context(project: &ProjectArgs) -> Result<DiscoveryContext> {
    let mut ctx = DiscoveryContext::default();
    if let Some(group) = &project.group {
        ctx.set("group._id", group).or_raise(|| ErrorKind::Import)?;
    }
    if let Some(label) = &project.project {
        ctx.set("project.label", label).or_raise(|| ErrorKind::Import)?;
    }
    Ok(ctx)
}

fn import_folder(importer: &mut Importer, args: &FolderArgs) -> Result<()> {
    let layout = FolderLayout {
        root_dirs: args.root_dirs,
        group_pinned: args.project.group.is_some(),
        project_pinned: args.project.project.is_some(),
        no_subjects: args.levels.no_subjects,
        no_sessions: args.levels.no_sessions,
        dicom: args.dicom.clone(),
        pack_acquisitions: args.pack_acquisitions.clone(),
    };
    println!("Template: {}", layout.describe());
    let template = layout.template().or_raise(|| ErrorKind::Import)?;
    let ctx = project_context(&args.project)?;
    importer
        .discover_template(&template, ctx, layout.merges_subject_and_session())
        .or_raise(|| ErrorKind::Import)
}

fn import_template(importer: &mut Importer, args: &TemplateArgs) -> Result<()> {
    let template = args
        .template
        .parse::<Template>()
        .or_raise(|| ErrorKind::Usage(format!("invalid template {:?}", args.template)))?;
    let mut ctx = project_context(&args.project)?;
    for (key, value) in &args.set_var {
        ctx.set(key, value).or_raise(|| ErrorKind::Usage(format!("cannot set {key}")))?;
    }
    let merge = args.levels.no_subjects || args.levels.no_sessions;
    importer.discover_template(&template, ctx, merge).or_raise(|| ErrorKind::Import)
}

fn import_dicom(importer: &mut Importer, args: &DicomArgs) -> Result<()> {
    let mut ctx = DiscoveryContext::default();
    let fields = [
        ("group._id", Some(&args.group)),
        ("project.label", Some(&args.project)),
        ("subject.label", args.subject.as_ref()),
        ("session.label", args.session.as_ref()),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            ctx.set(key, value).or_raise(|| ErrorKind::Import)?;
        }
    }
    importer.discover_dicom(ctx).or_raise(|| ErrorKind::Import)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::LevelArgs;
    use std::fs;
    use tempfile::TempDir;

    fn template_args(template: &str, set_var: Vec<(String, String)>) -> TemplateArgs {
        TemplateArgs {
            template: template.to_string(),
            folder: String::new(),
            project: ProjectArgs {
                group: Some("scitran".to_string()),
                project: None,
            },
            levels: LevelArgs {
                no_subjects: false,
                no_sessions: false,
            },
            set_var,
        }
    }

    fn importer(source: &TempDir, output: &TempDir) -> Importer {
        let walker = open_walker(&source.path().to_string_lossy(), false).unwrap();
        let resolver = Arc::new(FolderResolver::new(output.path()).unwrap());
        Importer::new(walker, resolver.clone(), resolver, ImportOptions::default())
    }

    #[test]
    fn test_import_template_with_variables() {
        let source = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("anx_s1")).unwrap();
        fs::write(source.path().join("anx_s1/notes.txt"), b"hello").unwrap();
        let output = TempDir::new().unwrap();
        let mut importer = importer(&source, &output);

        let args = template_args("{subject}", vec![("project.label".to_string(), "Anxiety Study".to_string())]);
        import_template(&mut importer, &args).unwrap();
        assert_eq!(importer.factory().count(hoist_hierarchy::ContainerKind::Subject), 1);
    }

    #[test]
    fn test_import_template_rejects_bad_templates() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let mut importer = importer(&source, &output);
        let err = import_template(&mut importer, &template_args("{subject},bogus=1", vec![])).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Usage(message) if message.contains("bogus")));
    }
}
