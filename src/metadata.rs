use std::path::Path;

use crate::codec;
use crate::dicom_access::{self, ElementAccess};
use crate::error::FileError;
use crate::models::DicomRecord;

/// Parse an IS value such as `"3"` or `" 12 "`; anything else is absent.
pub fn parse_series_number(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<u32>() {
        return Some(n);
    }
    // Some scanners write IS values as decimals ("3.0").
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= u32::MAX as f64)
        .map(|v| v as u32)
}

pub fn extract_record<T: ElementAccess>(obj: &T) -> DicomRecord {
    DicomRecord {
        patient_id: obj.element_text(dicom_access::PATIENT_ID),
        patient_name: obj.element_text(dicom_access::PATIENT_NAME),
        patient_birth_date: obj.element_text(dicom_access::PATIENT_BIRTH_DATE),
        study_date: obj.element_text(dicom_access::STUDY_DATE),
        study_instance_uid: obj.element_text(dicom_access::STUDY_INSTANCE_UID),
        series_number: obj
            .element_text(dicom_access::SERIES_NUMBER)
            .as_deref()
            .and_then(parse_series_number),
        series_description: obj.element_text(dicom_access::SERIES_DESCRIPTION),
        protocol_name: obj.element_text(dicom_access::PROTOCOL_NAME),
    }
}

/// Read the record of a plain or gzip-compressed DICOM file.
pub fn read_record(path: &Path) -> Result<DicomRecord, FileError> {
    let obj = codec::open(path)?;
    Ok(extract_record(&obj))
}
