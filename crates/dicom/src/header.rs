//! Partial header parsing.
//!
//! Grouping only needs a handful of identifiers near the top of the data
//! set, so parsing stops at Stack ID `(0020,9056)`; with related
//! acquisitions it stops just after the Referenced Frame of Reference
//! Sequence `(3006,0010)` instead. Pixel data is never read.

use crate::error::{ErrorKind, Result};
use crate::timestamp;
use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::file::ReadPreamble;
use dicom_object::{DefaultDicomObject, InMemDicomObject, OpenFileOptions};
use exn::{OptionExt, ResultExt};
use hoist_compress::PeekableReader;
use std::io::Read;
use time::PrimitiveDateTime;
use tracing::instrument;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

const STACK_ID: Tag = Tag(0x0020, 0x9056);
const AFTER_FRAME_OF_REFERENCE: Tag = Tag(0x3006, 0x0011);
pub(crate) const REFERENCED_FRAME_OF_REFERENCE_SEQUENCE: Tag = Tag(0x3006, 0x0010);
pub(crate) const RT_REFERENCED_STUDY_SEQUENCE: Tag = Tag(0x3006, 0x0012);
pub(crate) const RT_REFERENCED_SERIES_SEQUENCE: Tag = Tag(0x3006, 0x0014);

/// The back-link a derived object (registration, RT structure set) carries to
/// the series it was derived from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RelatedSeries {
    /// No Referenced Frame of Reference Sequence (or related parsing disabled).
    #[default]
    None,
    /// The referenced primary series instance UID.
    Series(String),
    /// The sequence is present but doesn't lead to a series UID.
    Malformed,
}

/// The identity and labelling fields of one DICOM file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DicomHeader {
    pub sop_instance_uid: Option<String>,
    pub series_instance_uid: Option<String>,
    pub study_instance_uid: Option<String>,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub manufacturer: Option<String>,
    pub modality: Option<String>,
    pub study_description: Option<String>,
    pub series_description: Option<String>,
    pub study_date: Option<String>,
    pub study_time: Option<String>,
    pub series_date: Option<String>,
    pub series_time: Option<String>,
    pub acquisition_date: Option<String>,
    pub acquisition_time: Option<String>,
    pub related: RelatedSeries,
}

impl DicomHeader {
    pub fn sop_uid(&self) -> Result<&str> {
        required(&self.sop_instance_uid, "SOPInstanceUID")
    }

    pub fn series_uid(&self) -> Result<&str> {
        required(&self.series_instance_uid, "SeriesInstanceUID")
    }

    pub fn study_uid(&self) -> Result<&str> {
        required(&self.study_instance_uid, "StudyInstanceUID")
    }

    /// `StudyDate` + `StudyTime`.
    pub fn study_timestamp(&self) -> Option<PrimitiveDateTime> {
        timestamp::parse(self.study_date.as_deref(), self.study_time.as_deref())
    }

    /// Series date/time for SIEMENS data, acquisition date/time otherwise,
    /// falling back to the series and then the study timestamp.
    pub fn acquisition_timestamp(&self) -> Option<PrimitiveDateTime> {
        let series = || timestamp::parse(self.series_date.as_deref(), self.series_time.as_deref());
        let acquisition = || timestamp::parse(self.acquisition_date.as_deref(), self.acquisition_time.as_deref());
        match self.manufacturer.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("SIEMENS") => series(),
            _ => acquisition().or_else(series),
        }
        .or_else(|| self.study_timestamp())
    }

    fn from_object(obj: &InMemDicomObject) -> Self {
        Self {
            sop_instance_uid: string(obj, tags::SOP_INSTANCE_UID),
            series_instance_uid: string(obj, tags::SERIES_INSTANCE_UID),
            study_instance_uid: string(obj, tags::STUDY_INSTANCE_UID),
            patient_id: string(obj, tags::PATIENT_ID),
            patient_name: string(obj, tags::PATIENT_NAME),
            manufacturer: string(obj, tags::MANUFACTURER),
            modality: string(obj, tags::MODALITY),
            study_description: string(obj, tags::STUDY_DESCRIPTION),
            series_description: string(obj, tags::SERIES_DESCRIPTION),
            study_date: string(obj, tags::STUDY_DATE),
            study_time: string(obj, tags::STUDY_TIME),
            series_date: string(obj, tags::SERIES_DATE),
            series_time: string(obj, tags::SERIES_TIME),
            acquisition_date: string(obj, tags::ACQUISITION_DATE),
            acquisition_time: string(obj, tags::ACQUISITION_TIME),
            related: related_series(obj),
        }
    }
}

/// Parse the identifying headers of a DICOM stream.
///
/// Accepts files with the standard 128-byte preamble as well as streams that
/// start directly at the `DICM` magic. Anything else is
/// [`NotDicom`](ErrorKind::NotDicom).
#[instrument(level = "trace", skip_all, fields(related = related))]
pub fn read_header<R: Read>(reader: R, related: bool) -> Result<DicomHeader> {
    let stop = match related {
        true => AFTER_FRAME_OF_REFERENCE,
        false => STACK_ID,
    };
    let obj = open(reader, Some(stop))?;
    let mut header = DicomHeader::from_object(&obj);
    if !related {
        header.related = RelatedSeries::None;
    }
    Ok(header)
}

/// Parse a complete DICOM file.
pub(crate) fn open<R: Read>(reader: R, stop: Option<Tag>) -> Result<DefaultDicomObject> {
    let mut peekable = PeekableReader::new(reader);
    let head = peekable.peek(PREAMBLE_LEN + MAGIC.len()).or_raise(|| ErrorKind::NotDicom)?;
    let skip = if head.len() == PREAMBLE_LEN + MAGIC.len() && &head[PREAMBLE_LEN..] == MAGIC {
        PREAMBLE_LEN
    } else if head.starts_with(MAGIC) {
        0
    } else {
        exn::bail!(ErrorKind::NotDicom);
    };
    let mut options = OpenFileOptions::new().read_preamble(ReadPreamble::Never);
    if let Some(tag) = stop {
        options = options.read_until(tag);
    }
    options.from_reader(peekable.skip_head(skip)).or_raise(|| ErrorKind::NotDicom)
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str> {
    value.as_deref().ok_or_raise(|| ErrorKind::MissingField(name))
}

/// A trimmed, non-empty string value.
pub(crate) fn string(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    let value = obj.element(tag).ok()?.to_str().ok()?;
    let value = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    match value.is_empty() {
        true => None,
        false => Some(value.to_string()),
    }
}

fn related_series(obj: &InMemDicomObject) -> RelatedSeries {
    let Ok(frames) = obj.element(REFERENCED_FRAME_OF_REFERENCE_SEQUENCE) else {
        return RelatedSeries::None;
    };
    first(frames.items())
        .and_then(|frame| first(frame.element(RT_REFERENCED_STUDY_SEQUENCE).ok()?.items()))
        .and_then(|study| first(study.element(RT_REFERENCED_SERIES_SEQUENCE).ok()?.items()))
        .and_then(|series| string(series, tags::SERIES_INSTANCE_UID))
        .map_or(RelatedSeries::Malformed, RelatedSeries::Series)
}

fn first(items: Option<&[InMemDicomObject]>) -> Option<&InMemDicomObject> {
    items.and_then(|items| items.first())
}

/// File names that are expected to hold DICOM data.
///
/// ```
/// assert!(hoist_dicom::is_dicom_name("IM0001.dcm.gz"));
/// assert!(hoist_dicom::is_dicom_name("scan.IMA"));
/// assert!(!hoist_dicom::is_dicom_name("notes.txt"));
/// ```
pub fn is_dicom_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    let lower = lower.strip_suffix(".gz").unwrap_or(&lower);
    [".dcm", ".dicom", ".ima"].iter().any(|ext| lower.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{basic, dicom_bytes, referencing};
    use dicom_core::value::DataSetSequence;
    use dicom_core::{DataElement, VR};
    use rstest::rstest;

    #[test]
    fn test_read_header_with_preamble() {
        let data = basic("1.2.3.4", "1.2.3", "1.2");
        let header = read_header(data.as_slice(), false).unwrap();
        assert_eq!(header.sop_uid().unwrap(), "1.2.3.4");
        assert_eq!(header.series_uid().unwrap(), "1.2.3");
        assert_eq!(header.study_uid().unwrap(), "1.2");
        assert_eq!(header.patient_id.as_deref(), Some("anx_s1"));
        assert_eq!(header.series_description.as_deref(), Some("fMRI"));
        assert_eq!(header.related, RelatedSeries::None);
        assert_eq!(timestamp::format_label(header.study_timestamp().unwrap()), "2018-04-12 09:30:15");
    }

    #[test]
    fn test_read_header_without_preamble() {
        let data = basic("1.2.3.4", "1.2.3", "1.2");
        let header = read_header(&data[PREAMBLE_LEN..], false).unwrap();
        assert_eq!(header.sop_uid().unwrap(), "1.2.3.4");
    }

    #[rstest]
    #[case(b"".as_slice())]
    #[case(b"hello world".as_slice())]
    #[case(&[0u8; 200])]
    fn test_not_dicom(#[case] data: &[u8]) {
        let err = read_header(data, false).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotDicom));
    }

    #[test]
    fn test_missing_field() {
        let data = dicom_bytes(&[(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3.4")], vec![]);
        let header = read_header(data.as_slice(), false).unwrap();
        let err = header.series_uid().unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingField("SeriesInstanceUID")));
    }

    #[test]
    fn test_related_series() {
        let data = referencing("9.9", "1.2.9", "1.2", "1.2.3");
        assert_eq!(read_header(data.as_slice(), true).unwrap().related, RelatedSeries::Series("1.2.3".into()));
        // Without related parsing the sequence is never reached.
        assert_eq!(read_header(data.as_slice(), false).unwrap().related, RelatedSeries::None);
    }

    #[test]
    fn test_related_series_malformed() {
        let data = dicom_bytes(
            &[(tags::SOP_INSTANCE_UID, VR::UI, "9.9")],
            vec![DataElement::new(
                REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
                VR::SQ,
                DataSetSequence::<InMemDicomObject>::from(vec![]),
            )],
        );
        assert_eq!(read_header(data.as_slice(), true).unwrap().related, RelatedSeries::Malformed);
    }

    #[rstest]
    #[case(Some("SIEMENS"), "2001-01-01 01:01:01")]
    #[case(Some("GE MEDICAL SYSTEMS"), "2002-02-02 02:02:02")]
    #[case(None, "2002-02-02 02:02:02")]
    fn test_acquisition_timestamp(#[case] manufacturer: Option<&str>, #[case] expected: &str) {
        let header = DicomHeader {
            manufacturer: manufacturer.map(String::from),
            series_date: Some("20010101".into()),
            series_time: Some("010101".into()),
            acquisition_date: Some("20020202".into()),
            acquisition_time: Some("020202".into()),
            ..Default::default()
        };
        assert_eq!(timestamp::format_label(header.acquisition_timestamp().unwrap()), expected);
    }

    #[test]
    fn test_acquisition_timestamp_falls_back_to_study() {
        let header = DicomHeader {
            study_date: Some("20030303".into()),
            study_time: Some("030303".into()),
            ..Default::default()
        };
        assert_eq!(timestamp::format_label(header.acquisition_timestamp().unwrap()), "2003-03-03 03:03:03");
    }
}
