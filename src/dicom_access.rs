use dicom::core::{Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{DefaultDicomObject, InMemDicomObject};

pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
pub const PATIENT_BIRTH_DATE: Tag = Tag(0x0010, 0x0030);

pub const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);
pub const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);
pub const STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);
pub const SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);
pub const FRAME_OF_REFERENCE_UID: Tag = Tag(0x0020, 0x0052);

pub const STUDY_DATE: Tag = Tag(0x0008, 0x0020);
pub const SERIES_NUMBER: Tag = Tag(0x0020, 0x0011);
pub const SERIES_DESCRIPTION: Tag = Tag(0x0008, 0x103E);
pub const PROTOCOL_NAME: Tag = Tag(0x0018, 0x1030);

pub const PATIENT_IDENTITY_REMOVED: Tag = Tag(0x0012, 0x0062);
pub const DEIDENTIFICATION_METHOD: Tag = Tag(0x0012, 0x0063);

/// Elements dropped outright during anonymization.
pub const REMOVED_TAGS: [Tag; 20] = [
    PATIENT_BIRTH_DATE,
    Tag(0x0010, 0x1040), // PatientAddress
    Tag(0x0010, 0x1000), // OtherPatientIDs
    Tag(0x0010, 0x1001), // OtherPatientNames
    Tag(0x0010, 0x1002), // OtherPatientIDsSequence
    Tag(0x0010, 0x0021), // IssuerOfPatientID
    Tag(0x0008, 0x0080), // InstitutionName
    Tag(0x0008, 0x0081), // InstitutionAddress
    Tag(0x0008, 0x1040), // InstitutionalDepartmentName
    Tag(0x0008, 0x1050), // PerformingPhysicianName
    Tag(0x0008, 0x1070), // OperatorsName
    Tag(0x0008, 0x1048), // PhysiciansOfRecord
    Tag(0x0008, 0x1060), // NameOfPhysiciansReadingStudy
    Tag(0x0010, 0x4000), // PatientComments
    Tag(0x0010, 0x2154), // PatientTelephoneNumbers
    Tag(0x0010, 0x21B0), // AdditionalPatientHistory
    Tag(0x0020, 0x4000), // ImageComments
    Tag(0x0032, 0x1032), // RequestingPhysician
    Tag(0x0008, 0x1010), // StationName
    Tag(0x0008, 0x002A), // AcquisitionDateTime
];

/// Type 2 elements kept present but emptied.
pub const EMPTIED_TAGS: [(Tag, VR); 3] = [
    (Tag(0x0008, 0x0090), VR::PN), // ReferringPhysicianName
    (Tag(0x0008, 0x0050), VR::SH), // AccessionNumber
    (Tag(0x0020, 0x0010), VR::SH), // StudyID
];

/// Dates moved back by the per-patient offset.
pub const SHIFTED_DATE_TAGS: [Tag; 4] = [
    STUDY_DATE,
    Tag(0x0008, 0x0021), // SeriesDate
    Tag(0x0008, 0x0022), // AcquisitionDate
    Tag(0x0008, 0x0023), // ContentDate
];

pub const REMAPPED_UID_TAGS: [Tag; 4] = [
    STUDY_INSTANCE_UID,
    SERIES_INSTANCE_UID,
    SOP_INSTANCE_UID,
    FRAME_OF_REFERENCE_UID,
];

pub fn is_private(tag: Tag) -> bool {
    tag.group() % 2 == 1
}

/// Small helper trait to pull string values from different DICOM object shapes.
pub trait ElementAccess {
    fn element_str(&self, tag: Tag) -> Option<String>;
    fn has_element(&self, tag: Tag) -> bool;
    fn transfer_syntax(&self) -> Option<String>;

    /// Trimmed text value, treating blank values as absent.
    fn element_text(&self, tag: Tag) -> Option<String> {
        self.element_str(tag)
            .map(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_string())
            .filter(|s| !s.is_empty())
    }
}

impl ElementAccess for DefaultDicomObject {
    fn element_str(&self, tag: Tag) -> Option<String> {
        self.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.into_owned())
    }

    fn has_element(&self, tag: Tag) -> bool {
        self.element(tag).is_ok()
    }

    fn transfer_syntax(&self) -> Option<String> {
        Some(self.meta().transfer_syntax().to_string())
    }
}

impl ElementAccess for InMemDicomObject<StandardDataDictionary> {
    fn element_str(&self, tag: Tag) -> Option<String> {
        self.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.into_owned())
    }

    fn has_element(&self, tag: Tag) -> bool {
        self.element(tag).is_ok()
    }

    fn transfer_syntax(&self) -> Option<String> {
        None
    }
}
