//
// anonymize.rs
// CMR-Curate-rs
//
// Batch anonymization: resolves each file's patient through the identity mapper, rewrites identifying fields and writes a compressed copy.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{DefaultDicomObject, FileDicomObject, FileMetaTableBuilder};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::batch;
use crate::codec;
use crate::config::Config;
use crate::dicom_access::{self, ElementAccess};
use crate::error::{FileError, StoreError};
use crate::identity::{AnonymizedIdentity, IdentityMapper, OriginalIdentity};
use crate::metadata;
use crate::models::{AnonymizeSummary, SkipEntry};
use crate::store::MappingStore;

const DATE_FORMAT: &str = "%Y%m%d";
const UNDATED: &str = "UNDATED";

#[derive(Debug, Clone)]
pub struct AnonymizeOptions {
    pub max_date_shift_days: u32,
    pub deidentification_method: String,
}

impl AnonymizeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_date_shift_days: config.max_date_shift_days,
            deidentification_method: config.deidentification_method.clone(),
        }
    }
}

impl Default for AnonymizeOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Outcome of anonymizing one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Anonymized(PathBuf),
    AlreadyAnonymized(PathBuf),
}

// What the read-only scan keeps per file; the object itself is re-read only when it must be written.
#[derive(Debug)]
struct ScannedFile {
    path: PathBuf,
    original: OriginalIdentity,
    content_hash: String,
    study_date: Option<String>,
    study_instance_uid: Option<String>,
}

pub struct Anonymizer<S: MappingStore> {
    mapper: IdentityMapper<S>,
    options: AnonymizeOptions,
}

impl<S: MappingStore> Anonymizer<S> {
    pub fn new(mapper: IdentityMapper<S>, options: AnonymizeOptions) -> Self {
        Self { mapper, options }
    }

    /// Open the mapping store; a corrupt store fails here, before any file is touched.
    pub fn open(store: S, config: &Config) -> Result<Self, StoreError> {
        let mapper = IdentityMapper::open(store, config.pseudonym_prefix.clone())?;
        Ok(Self::new(mapper, AnonymizeOptions::from_config(config)))
    }

    pub fn mapper(&self) -> &IdentityMapper<S> {
        &self.mapper
    }

    /// Anonymize every input under `source` into `target`.
    ///
    /// Unreadable files are skipped and reported. A [`StoreError`] aborts the
    /// run and can be recovered with `downcast_ref`.
    pub fn run(&mut self, source: &Path, target: &Path) -> Result<AnonymizeSummary> {
        let discovery = batch::discover(source, Some(target), batch::is_anonymizer_input);
        let mut summary = AnonymizeSummary {
            skipped: discovery.skipped,
            ..Default::default()
        };
        let created_before = self.mapper.created_this_run();
        self.reserve_existing_pseudonyms(target);

        let scanned: Vec<Result<ScannedFile, FileError>> =
            discovery.files.par_iter().map(|path| scan_file(path)).collect();

        for scan in scanned {
            let file = match scan {
                Ok(file) => file,
                Err(e) => {
                    warn!(error = %e, "skipping file");
                    summary.skipped.push(skip_for(e));
                    continue;
                }
            };

            let identity = self.mapper.resolve(&file.original)?;
            match self.write_file(&file, &identity, target) {
                Ok(FileOutcome::Anonymized(out)) => {
                    debug!(input = ?file.path, output = ?out, "anonymized");
                    summary.anonymized += 1;
                }
                Ok(FileOutcome::AlreadyAnonymized(out)) => {
                    debug!(input = ?file.path, output = ?out, "already anonymized");
                    summary.already_anonymized += 1;
                }
                Err(e) => {
                    warn!(error = %e, "skipping file");
                    summary.skipped.push(skip_for(e));
                }
            }
        }

        summary.new_identities = self.mapper.created_this_run() - created_before;
        batch::log_skips("anonymize", &summary.skipped);
        info!(
            anonymized = summary.anonymized,
            already_anonymized = summary.already_anonymized,
            new_identities = summary.new_identities,
            skipped = summary.skipped.len(),
            "anonymization finished"
        );
        Ok(summary)
    }

    // Patient folders already in the target keep their pseudonym even when the
    // store no longer knows them.
    fn reserve_existing_pseudonyms(&mut self, target: &Path) {
        let Ok(entries) = fs::read_dir(target) else {
            return;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if self.mapper.reserve(name) {
                    warn!(dir = ?entry.path(), "pseudonym present in target but not in mapping store; reserved");
                }
            }
        }
    }

    fn write_file(
        &self,
        file: &ScannedFile,
        identity: &AnonymizedIdentity,
        target: &Path,
    ) -> Result<FileOutcome, FileError> {
        let shift = identity.date_shift_days(self.options.max_date_shift_days);
        let new_study_uid = file.study_instance_uid.as_deref().map(remap_uid);
        let shifted_date = file.study_date.as_deref().and_then(|d| shift_date(d, shift));

        let output = target
            .join(identity.as_str())
            .join(study_dir(shifted_date.as_deref(), new_study_uid.as_deref()))
            .join(format!(
                "{}.{}",
                fingerprint(&file.original, &file.content_hash),
                codec::COMPRESSED_EXTENSION
            ));
        if output.exists() {
            return Ok(FileOutcome::AlreadyAnonymized(output));
        }

        let obj = codec::open(&file.path)?;
        let anonymized = anonymize_object(obj, identity, &self.options)
            .map_err(|reason| FileError::Encode {
                path: file.path.clone(),
                reason,
            })?;
        let bytes = codec::encode(&anonymized, &file.path)?;
        codec::write_compressed(&output, &bytes)?;
        Ok(FileOutcome::Anonymized(output))
    }
}

fn skip_for(error: FileError) -> SkipEntry {
    let path = match &error {
        FileError::Unreadable { path, .. }
        | FileError::MissingIdentity { path }
        | FileError::Write { path, .. }
        | FileError::Encode { path, .. } => path.clone(),
    };
    SkipEntry::new(path, error)
}

fn scan_file(path: &Path) -> Result<ScannedFile, FileError> {
    let bytes = codec::read_bytes(path)?;
    let content_hash = hex::encode(Sha256::digest(&bytes));
    let obj = codec::parse(path, &bytes)?;
    let record = metadata::extract_record(&obj);
    let original = OriginalIdentity::from_record(&record).ok_or_else(|| FileError::MissingIdentity {
        path: path.to_path_buf(),
    })?;
    Ok(ScannedFile {
        path: path.to_path_buf(),
        original,
        content_hash,
        study_date: record.study_date,
        study_instance_uid: record.study_instance_uid,
    })
}

/// Move a DA value back by `days`; `None` when the value is not a valid date.
pub fn shift_date(value: &str, days: u64) -> Option<String> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .ok()?
        .checked_sub_days(Days::new(days))
        .map(|d| d.format(DATE_FORMAT).to_string())
}

/// Deterministic replacement UID under the `2.25` (UUID-derived) root.
pub fn remap_uid(uid: &str) -> String {
    let digest = Sha256::digest(format!("uid:{}", uid.trim_end_matches('\0').trim()).as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    format!("2.25.{}", u128::from_be_bytes(bytes))
}

/// `<shifted StudyDate | UNDATED>_<8 hex of the new StudyInstanceUID>`.
pub fn study_dir(shifted_study_date: Option<&str>, new_study_uid: Option<&str>) -> String {
    let uid_hash = hex::encode(Sha256::digest(new_study_uid.unwrap_or_default().as_bytes()));
    format!("{}_{}", shifted_study_date.unwrap_or(UNDATED), &uid_hash[..8])
}

/// Output name of an input file: stable for the same patient and the same bytes.
pub fn fingerprint(original: &OriginalIdentity, content_hash: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", original.as_str(), content_hash).as_bytes());
    hex::encode(digest)[..32].to_string()
}

/// Apply the field policy to one object and rebuild its file meta to match.
pub fn anonymize_object(
    obj: DefaultDicomObject,
    identity: &AnonymizedIdentity,
    options: &AnonymizeOptions,
) -> Result<DefaultDicomObject, String> {
    let transfer_syntax = obj.meta().transfer_syntax().to_string();
    let sop_class_uid = obj
        .meta()
        .media_storage_sop_class_uid
        .trim_end_matches('\0')
        .to_string();
    let mut dataset = obj.into_inner();

    let private: Vec<Tag> = dataset
        .iter()
        .map(|e| e.header().tag)
        .filter(|tag| dicom_access::is_private(*tag))
        .collect();
    for tag in private.into_iter().chain(dicom_access::REMOVED_TAGS) {
        dataset.remove_element(tag);
    }

    for (tag, vr) in dicom_access::EMPTIED_TAGS {
        dataset.put(DataElement::new(tag, vr, PrimitiveValue::Empty));
    }
    dataset.put(DataElement::new(
        dicom_access::PATIENT_NAME,
        VR::PN,
        PrimitiveValue::from(identity.as_str()),
    ));
    dataset.put(DataElement::new(
        dicom_access::PATIENT_ID,
        VR::LO,
        PrimitiveValue::from(identity.as_str()),
    ));

    let shift = identity.date_shift_days(options.max_date_shift_days);
    for tag in dicom_access::SHIFTED_DATE_TAGS {
        let Some(value) = dataset.element_text(tag) else {
            continue;
        };
        match shift_date(&value, shift) {
            Some(shifted) => {
                dataset.put(DataElement::new(tag, VR::DA, PrimitiveValue::from(shifted)));
            }
            None => {
                dataset.remove_element(tag);
            }
        }
    }

    for tag in dicom_access::REMAPPED_UID_TAGS {
        if let Some(uid) = dataset.element_text(tag) {
            dataset.put(DataElement::new(tag, VR::UI, PrimitiveValue::from(remap_uid(&uid))));
        }
    }

    dataset.put(DataElement::new(
        dicom_access::PATIENT_IDENTITY_REMOVED,
        VR::CS,
        PrimitiveValue::from("YES"),
    ));
    dataset.put(DataElement::new(
        dicom_access::DEIDENTIFICATION_METHOD,
        VR::LO,
        PrimitiveValue::from(options.deidentification_method.as_str()),
    ));

    let sop_instance_uid = dataset
        .element_text(dicom_access::SOP_INSTANCE_UID)
        .ok_or_else(|| "missing SOPInstanceUID".to_string())?;
    let sop_class_uid = dataset
        .element_text(dicom_access::SOP_CLASS_UID)
        .unwrap_or(sop_class_uid);

    let file_meta = FileMetaTableBuilder::new()
        .transfer_syntax(transfer_syntax.trim_end_matches('\0'))
        .media_storage_sop_class_uid(sop_class_uid)
        .media_storage_sop_instance_uid(sop_instance_uid)
        .build()
        .map_err(|e| e.to_string())?;

    let mut file_obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, file_meta);
    for elem in dataset {
        file_obj.put(elem);
    }
    Ok(file_obj)
}

/// Anonymize a whole tree with a freshly opened mapper, failing on any store problem.
pub fn anonymize_tree<S: MappingStore>(
    store: S,
    config: &Config,
    source: &Path,
    target: &Path,
) -> Result<AnonymizeSummary> {
    let mut anonymizer = Anonymizer::open(store, config).context("mapping store is unusable; nothing was anonymized")?;
    anonymizer.run(source, target)
}
