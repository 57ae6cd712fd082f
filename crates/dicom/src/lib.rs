//! Just enough DICOM for grouping and de-identification.
//!
//! - [`read_header`] pulls the identity fields (SOP/series/study instance
//!   UIDs, patient ID, descriptions, dates) out of a part 10 stream without
//!   reading pixel data.
//! - [`deidentify_minimal`] is the transform behind the `minimal`
//!   de-identification profile.

mod deid;
pub mod error;
mod header;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod timestamp;

pub use crate::deid::{Deidentified, deidentify_minimal};
pub use crate::header::{DicomHeader, RelatedSeries, is_dicom_name, read_header};
