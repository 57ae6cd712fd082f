//! Scanners take over discovery for a whole subtree.
//!
//! Where the template walk looks at one directory name at a time, a scanner
//! looks at every file below its starting point and decides for itself
//! which containers they belong to.

mod dicom;
mod slurp;

pub use self::dicom::{DicomScanner, SubjectMapper, SubjectMapperHandle};
pub use self::slurp::SlurpScanner;
use crate::error::{Error, ErrorKind, Result};
use derive_more::Display;
use hoist_hierarchy::{ContainerFactory, DiscoveryContext, Message};
use hoist_storage::Walker;
use std::path::Path;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ScannerKind {
    #[display("dicom")]
    Dicom,
    #[display("slurp")]
    Slurp,
}

impl FromStr for ScannerKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dicom" => Ok(Self::Dicom),
            "slurp" => Ok(Self::Slurp),
            other => exn::bail!(ErrorKind::Template(format!("unknown scanner {other:?}"))),
        }
    }
}

impl ScannerKind {
    /// A fresh scanner; each subtree gets its own.
    pub fn create(&self, options: &ScanOptions) -> Box<dyn Scanner> {
        match self {
            Self::Dicom => Box::new(DicomScanner::new(options.clone())),
            Self::Slurp => Box::new(SlurpScanner),
        }
    }
}

/// Settings shared by every scanner a discovery run creates.
#[derive(Clone, Default)]
pub struct ScanOptions {
    /// Link secondary series to the series they reference
    pub related_acquisitions: bool,
    pub subject_mapper: Option<SubjectMapperHandle>,
}

pub trait Scanner {
    /// Discover every file below `prefix`, adding containers to `factory`.
    ///
    /// Problems with individual files are returned as messages; only
    /// failures that make the whole subtree unusable are errors.
    fn discover(
        &mut self,
        walker: &dyn Walker,
        ctx: &DiscoveryContext,
        factory: &mut ContainerFactory,
        prefix: &Path,
    ) -> Result<Vec<Message>>;
}
