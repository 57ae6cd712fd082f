//! Tracing setup for the binary.
//!
//! Diagnostics go to stderr so they never mix with the hierarchy summary on
//! stdout. `HOIST_LOG` takes an [`EnvFilter`] directive and overrides the
//! level chosen by `--debug` / `--quiet`.

use crate::error::{ErrorKind, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const ENV_FILTER: &str = "HOIST_LOG";

fn default_directive(debug: bool, quiet: bool) -> &'static str {
    match (debug, quiet) {
        (true, _) => "debug",
        (false, true) => "error",
        (false, false) => "warn",
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the log file when dropped, so it must live
/// until the program exits.
pub fn init(debug: bool, quiet: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env(ENV_FILTER).unwrap_or_else(|_| EnvFilter::new(default_directive(debug, quiet)));
    let stderr = fmt::layer().with_writer(std::io::stderr).without_time().with_target(debug);

    let (file, guard) = match log_file {
        Some(path) => {
            let directory = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| ErrorKind::Logging(format!("not a file: {}", path.display())))?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(directory, name));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()
        .map_err(|err| ErrorKind::Logging(err.to_string()))?;
    Ok(guard)
}
