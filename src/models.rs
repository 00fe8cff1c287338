//
// models.rs
// CMR-Curate-rs
//
// Defines the metadata view of one DICOM file and the serializable run summaries and reports of each stage.
//
// Thales Matheus Mendonça Santos - October 2026

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::classify::AxisMatch;

/// Logical view of the fields the pipeline consumes from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicomRecord {
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub patient_birth_date: Option<String>,
    pub study_date: Option<String>,
    pub study_instance_uid: Option<String>,
    pub series_number: Option<u32>,
    pub series_description: Option<String>,
    pub protocol_name: Option<String>,
}

impl DicomRecord {
    /// Text classified on the image-type axis.
    pub fn image_type_text(&self) -> &str {
        self.series_description
            .as_deref()
            .or(self.protocol_name.as_deref())
            .unwrap_or("")
    }

    /// Text classified on the anatomy axis. Cardiac views live in the description too.
    pub fn anatomy_text(&self) -> &str {
        self.image_type_text()
    }
}

/// A file that was not fully processed, with the reason shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipEntry {
    pub path: PathBuf,
    pub reason: String,
}

impl SkipEntry {
    pub fn new(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnonymizeSummary {
    pub anonymized: usize,
    pub already_anonymized: usize,
    pub new_identities: usize,
    pub skipped: Vec<SkipEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SortSummary {
    pub sorted: usize,
    pub already_sorted: usize,
    /// Files placed in the fallback bucket because they lack a series number.
    pub unsorted: Vec<PathBuf>,
    /// Destinations holding different content; left untouched.
    pub conflicts: Vec<SkipEntry>,
    pub skipped: Vec<SkipEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Renamed {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogueSummary {
    pub renamed: Vec<Renamed>,
    pub already_catalogued: usize,
    /// Series directories whose final name carries at least one `Other` axis.
    pub fallback_labels: Vec<PathBuf>,
    pub collisions: Vec<SkipEntry>,
    /// Directories without any parseable DICOM file.
    pub unreadable: Vec<SkipEntry>,
    /// Renames the filesystem refused.
    pub failed: Vec<SkipEntry>,
}

/// File count comparison for one patient folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMismatch {
    pub folder: String,
    pub source_files: usize,
    pub target_files: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub missing_in_target: Vec<String>,
    pub only_in_target: Vec<String>,
    pub mismatches: Vec<CountMismatch>,
    pub checked_folders: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.missing_in_target.is_empty()
            && self.only_in_target.is_empty()
            && self.mismatches.is_empty()
    }
}

/// One distinct series description and how the rule table labels it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionRow {
    pub description: String,
    pub count: usize,
    pub image_type: String,
    pub image_type_match: AxisMatch,
    pub anatomy: String,
    pub anatomy_match: AxisMatch,
}

/// Presence of each series description per patient folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceOverview {
    /// Column order of every `present` vector.
    pub descriptions: Vec<String>,
    pub patients: Vec<PatientSequences>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientSequences {
    pub patient: String,
    /// `1` when the patient has at least one series with that description, else `0`.
    pub present: Vec<u8>,
}
