//! Discovery, packaging and upload of source trees into the container
//! hierarchy.
//!
//! A [`Template`](template::Template) (or the [`FolderLayout`] shorthand)
//! describes how directory names map onto hierarchy levels. [`discover`]
//! walks a source tree with it, handing subtrees to a
//! [`Scanner`](scanner::Scanner) where the template says so. The
//! [`Importer`] then turns the resulting container tree into packfile and
//! upload tasks on a [`WorkQueue`](hoist_queue::WorkQueue).
//!
//! ```
//! use hoist_import::template::Template;
//!
//! let template: Template = "{group}:{project}:{subject}:{session}:{acquisition}:dicom,packfile_type=dicom"
//!     .parse()
//!     .unwrap();
//! # let _ = template;
//! ```

mod consts;
mod deid;
mod discover;
pub mod error;
mod folder;
mod importer;
mod packfile;
pub mod scanner;
pub mod template;
mod upload;

pub use crate::deid::DeidProfile;
pub use crate::discover::{DiscoveryOptions, discover};
pub use crate::folder::FolderLayout;
pub use crate::importer::{Console, ImportOptions, ImportReport, Importer};
pub use crate::packfile::{create_packfile, packfile_name};
