//! Builders for small in-memory DICOM files.
//!
//! Enabled with the `testing` feature for use in other crates' tests.

use crate::header::{
    REFERENCED_FRAME_OF_REFERENCE_SEQUENCE, RT_REFERENCED_SERIES_SEQUENCE, RT_REFERENCED_STUDY_SEQUENCE, string,
};
use dicom_core::value::DataSetSequence;
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};

/// Build a minimal part 10 file in memory.
pub fn dicom_bytes(fields: &[(Tag, VR, &str)], extra: Vec<DataElement<InMemDicomObject>>) -> Vec<u8> {
    let mut obj = InMemDicomObject::new_empty();
    for (tag, vr, value) in fields {
        obj.put(DataElement::new(*tag, *vr, PrimitiveValue::from(*value)));
    }
    for element in extra {
        obj.put(element);
    }
    let sop = string(&obj, tags::SOP_INSTANCE_UID).unwrap_or_else(|| "1.2.3".to_string());
    let file = obj
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax("1.2.840.10008.1.2.1")
                .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.4")
                .media_storage_sop_instance_uid(sop),
        )
        .unwrap();
    let mut out = Vec::new();
    file.write_all(&mut out).unwrap();
    out
}

pub fn basic(sop: &str, series: &str, study: &str) -> Vec<u8> {
    dicom_bytes(
        &[
            (tags::SOP_INSTANCE_UID, VR::UI, sop),
            (tags::SERIES_INSTANCE_UID, VR::UI, series),
            (tags::STUDY_INSTANCE_UID, VR::UI, study),
            (tags::PATIENT_ID, VR::LO, "anx_s1"),
            (tags::PATIENT_NAME, VR::PN, "Doe^Jane"),
            (tags::MODALITY, VR::CS, "MR"),
            (tags::SERIES_DESCRIPTION, VR::LO, "fMRI"),
            (tags::STUDY_DATE, VR::DA, "20180412"),
            (tags::STUDY_TIME, VR::TM, "093015"),
        ],
        vec![],
    )
}

/// A file with the three identity UIDs and whatever else is given.
pub fn identified(sop: &str, series: &str, study: &str, fields: &[(Tag, VR, &str)]) -> Vec<u8> {
    let mut all = vec![
        (tags::SOP_INSTANCE_UID, VR::UI, sop),
        (tags::SERIES_INSTANCE_UID, VR::UI, series),
        (tags::STUDY_INSTANCE_UID, VR::UI, study),
    ];
    all.extend_from_slice(fields);
    dicom_bytes(&all, vec![])
}

pub fn referencing(sop: &str, series: &str, study: &str, primary: &str) -> Vec<u8> {
    let series_item = InMemDicomObject::from_element_iter([DataElement::new(
        tags::SERIES_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from(primary),
    )]);
    let study_item = InMemDicomObject::from_element_iter([DataElement::new(
        RT_REFERENCED_SERIES_SEQUENCE,
        VR::SQ,
        DataSetSequence::from(vec![series_item]),
    )]);
    let frame_item = InMemDicomObject::from_element_iter([DataElement::new(
        RT_REFERENCED_STUDY_SEQUENCE,
        VR::SQ,
        DataSetSequence::from(vec![study_item]),
    )]);
    dicom_bytes(
        &[
            (tags::SOP_INSTANCE_UID, VR::UI, sop),
            (tags::SERIES_INSTANCE_UID, VR::UI, series),
            (tags::STUDY_INSTANCE_UID, VR::UI, study),
            (tags::MODALITY, VR::CS, "REG"),
        ],
        vec![DataElement::new(
            REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![frame_item]),
        )],
    )
}
