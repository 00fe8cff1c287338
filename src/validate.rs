//
// validate.rs
// CMR-Curate-rs
//
// Cross-checks a sorted tree against the anonymized tree it came from, patient by patient.
//
// Thales Matheus Mendonça Santos - October 2026

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::batch;
use crate::models::{CountMismatch, ValidationReport};

/// Number of sorter-input files under each top-level folder of `root`.
fn count_per_folder(root: &Path) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    let entries = fs::read_dir(root).with_context(|| format!("Failed to list {root:?}"))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !path.is_dir() || name.starts_with('.') {
            continue;
        }
        let files = batch::discover(&path, None, batch::is_sorter_input).files.len();
        counts.insert(name, files);
    }
    Ok(counts)
}

/// Compare per-patient file counts of the anonymized tree and the sorted tree.
pub fn validate_sorted(anonymized_root: &Path, sorted_root: &Path) -> Result<ValidationReport> {
    let source = count_per_folder(anonymized_root)?;
    let target = count_per_folder(sorted_root)?;
    let mut report = ValidationReport::default();

    for (folder, &source_files) in &source {
        match target.get(folder) {
            None => report.missing_in_target.push(folder.clone()),
            Some(&target_files) if target_files != source_files => {
                report.mismatches.push(CountMismatch {
                    folder: folder.clone(),
                    source_files,
                    target_files,
                })
            }
            Some(_) => {}
        }
    }
    report.only_in_target = target
        .keys()
        .filter(|folder| !source.contains_key(*folder))
        .cloned()
        .collect();
    report.checked_folders = source.len();

    if report.is_clean() {
        info!(folders = report.checked_folders, "sorted tree matches its source");
    } else {
        warn!(
            missing = report.missing_in_target.len(),
            extra = report.only_in_target.len(),
            mismatches = report.mismatches.len(),
            "sorted tree does not match its source"
        );
    }
    Ok(report)
}
