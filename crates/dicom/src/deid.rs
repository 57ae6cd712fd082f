//! The built-in `minimal` de-identification transform.

use crate::error::{ErrorKind, Result};
use crate::header::{open, string};
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use exn::{OptionExt, ResultExt};
use tracing::instrument;

const OTHER_PATIENT_IDS: Tag = Tag(0x0010, 0x1000);
const REMOVED: [Tag; 3] = [tags::PATIENT_BIRTH_DATE, tags::PATIENT_ADDRESS, OTHER_PATIENT_IDS];

/// A transformed DICOM file and the name it should be stored under.
#[derive(Debug)]
pub struct Deidentified {
    /// `{Modality}.{SOPInstanceUID}.dcm`
    pub name: String,
    pub sop_instance_uid: String,
    pub data: Vec<u8>,
}

/// Blank `PatientName`, drop birth date, address and other patient IDs.
///
/// The whole file is parsed, so pixel data survives untouched.
#[instrument(level = "trace", skip_all)]
pub fn deidentify_minimal(data: &[u8]) -> Result<Deidentified> {
    let mut obj = open(data, None)?;
    let sop_instance_uid = string(&obj, tags::SOP_INSTANCE_UID).ok_or_raise(|| ErrorKind::MissingField("SOPInstanceUID"))?;
    let modality = string(&obj, tags::MODALITY).unwrap_or_else(|| "UNKNOWN".to_string());

    if obj.element(tags::PATIENT_NAME).is_ok() {
        obj.put(DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("")));
    }
    for tag in REMOVED {
        obj.remove_element(tag);
    }

    let mut out = Vec::with_capacity(data.len());
    obj.write_all(&mut out).or_raise(|| ErrorKind::Write(sop_instance_uid.clone()))?;
    Ok(Deidentified {
        name: format!("{modality}.{sop_instance_uid}.dcm"),
        sop_instance_uid,
        data: out,
    })
}
