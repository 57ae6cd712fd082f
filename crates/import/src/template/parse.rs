//! The template string syntax.
//!
//! Levels are separated by unescaped `:`. Each level is a match pattern
//! optionally followed by an unescaped `,` and a comma-separated option
//! list:
//!
//! ```text
//! {group}:{project}:sub-{subject}:{session}:{acquisition}:dicom,packfile_type=dicom
//! {group}:{project}:{subject},scan=dicom
//! ```
//!
//! Options are `packfile_type`, `packfile_name` and `scan` (`dicom` or
//! `slurp`).

use crate::error::{Error, ErrorKind};
use crate::scanner::ScannerKind;
use crate::template::{NodeSpec, Template, TemplateBuilder, compile_regex};
use std::str::FromStr;
use tracing::instrument;

impl FromStr for Template {
    type Err = Error;

    /// Compile every level eagerly so a bad template fails before discovery.
    #[instrument(level = "debug", skip_all, fields(template = s))]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut builder = TemplateBuilder::default();
        let mut scanned = false;
        for section in split_unescaped(s, ':', usize::MAX) {
            if scanned {
                exn::bail!(ErrorKind::Template("cannot declare nodes after a scanner".to_string()));
            }
            let mut parts = split_unescaped(section, ',', 1).into_iter();
            let pattern = parts.next().unwrap_or_default();
            let mut spec = NodeSpec::pattern(compile_regex(pattern)?);
            let mut scanner = None;
            for (key, value) in parse_options(parts.next().unwrap_or_default()) {
                spec = match key {
                    "packfile_type" => spec.packfile(value),
                    "packfile_name" => spec.packfile_name(value),
                    "scan" => {
                        scanner = Some(value.parse::<ScannerKind>()?);
                        spec
                    },
                    other => exn::bail!(ErrorKind::Template(format!("unknown option {other:?}"))),
                };
            }
            builder = builder.add_node(spec);
            if let Some(kind) = scanner {
                builder = builder.add_scanner(kind);
                scanned = true;
            }
        }
        builder.build()
    }
}

/// Split on `separator` where it isn't preceded by a backslash, at most
/// `limit` times. Backslashes are kept.
fn split_unescaped(value: &str, separator: char, limit: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut previous = None;
    for (index, c) in value.char_indices() {
        if c == separator && previous != Some('\\') && parts.len() < limit {
            parts.push(&value[start..index]);
            start = index + c.len_utf8();
        }
        previous = Some(c);
    }
    parts.push(&value[start..]);
    parts
}

fn parse_options(options: &str) -> Vec<(&str, &str)> {
    options
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key.trim(), value.trim())
        })
        .collect()
}
