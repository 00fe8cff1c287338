//
// catalogue.rs
// CMR-Curate-rs
//
// Renames sorted series directories in place to Series<N>_<ImageType>_<Anatomy>, with a pure planner deciding each rename.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::batch;
use crate::classify::{Classification, Classifier};
use crate::error::CatalogueError;
use crate::metadata;
use crate::models::{CatalogueSummary, DicomRecord, Renamed, SkipEntry};

pub const SERIES_PREFIX: &str = "Series";

/// Split `Series<N>` or `Series<N>_<rest>` into its number and optional suffix.
pub fn parse_series_dir(name: &str) -> Option<(u32, Option<&str>)> {
    let tail = name.strip_prefix(SERIES_PREFIX)?;
    let digits_end = tail.find(|c: char| !c.is_ascii_digit()).unwrap_or(tail.len());
    if digits_end == 0 {
        return None;
    }
    let number = tail[..digits_end].parse().ok()?;
    match &tail[digits_end..] {
        "" => Some((number, None)),
        rest => rest.strip_prefix('_').map(|suffix| (number, Some(suffix))),
    }
}

pub fn series_number_of(name: &str) -> Option<u32> {
    parse_series_dir(name).map(|(number, _)| number)
}

pub fn catalogue_name(series_number: u32, classification: &Classification) -> String {
    format!("{SERIES_PREFIX}{series_number}_{}", classification.label())
}

/// True for `Series<N>_<T>_<A>` where both labels come from the rule table or are `Other`.
///
/// Labels may contain `_`, so every split point is tried.
pub fn is_catalogued(name: &str, classifier: &Classifier) -> bool {
    let Some((_, Some(suffix))) = parse_series_dir(name) else {
        return false;
    };
    suffix.match_indices('_').any(|(i, _)| {
        classifier.is_image_type_label(&suffix[..i]) && classifier.is_anatomy_label(&suffix[i + 1..])
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameAction {
    Keep,
    Rename { to: String },
}

/// Decide what to do with a directory currently named `current` whose
/// classification yields `desired`.
pub fn plan_rename(current: &str, desired: &str, classifier: &Classifier) -> RenameAction {
    if current == desired || is_catalogued(current, classifier) {
        RenameAction::Keep
    } else {
        RenameAction::Rename {
            to: desired.to_string(),
        }
    }
}

/// Series directories under `root`, in path order. Their contents are not descended into.
pub fn series_directories(root: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "cannot visit entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let is_series = entry
            .file_name()
            .to_str()
            .is_some_and(|name| series_number_of(name).is_some());
        if is_series {
            dirs.push(entry.into_path());
            walker.skip_current_dir();
        }
    }
    dirs
}

/// Metadata of the first readable file of `dir`, in file name order.
pub fn representative_record(dir: &Path) -> Result<DicomRecord, CatalogueError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|_| CatalogueError::NoReadableFile {
            dir: dir.to_path_buf(),
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && batch::is_sorter_input(p))
        .collect();
    files.sort();

    for file in &files {
        match metadata::read_record(file) {
            Ok(record) => return Ok(record),
            Err(e) => debug!(error = %e, "not usable as representative"),
        }
    }
    Err(CatalogueError::NoReadableFile {
        dir: dir.to_path_buf(),
    })
}

/// Rename every series directory under `root` after its classification.
///
/// Collisions and unreadable directories are recorded and leave the
/// directory untouched; the remaining directories are still processed.
pub fn catalogue(root: &Path, classifier: &Classifier) -> Result<CatalogueSummary> {
    anyhow::ensure!(root.is_dir(), "{root:?} is not a directory");
    let mut summary = CatalogueSummary::default();

    for dir in series_directories(root) {
        let Some(current) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let Some(number) = series_number_of(&current) else {
            continue;
        };
        if is_catalogued(&current, classifier) {
            debug!(?dir, "already catalogued");
            summary.already_catalogued += 1;
            continue;
        }

        let record = match representative_record(&dir) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "series left unchanged");
                summary.unreadable.push(SkipEntry::new(&dir, e));
                continue;
            }
        };
        let classification = classifier.classify(record.image_type_text(), record.anatomy_text());
        let desired = catalogue_name(number, &classification);

        match plan_rename(&current, &desired, classifier) {
            RenameAction::Keep => summary.already_catalogued += 1,
            RenameAction::Rename { to } => {
                let destination = dir.with_file_name(&to);
                if destination.exists() {
                    let e = CatalogueError::NameCollision {
                        from: dir.clone(),
                        to: destination,
                    };
                    warn!(error = %e, "name collision; resolve manually");
                    summary.collisions.push(SkipEntry::new(&dir, e));
                    continue;
                }
                if let Err(source) = fs::rename(&dir, &destination) {
                    let e = CatalogueError::Rename {
                        from: dir.clone(),
                        source,
                    };
                    warn!(error = %e, "series left unchanged");
                    summary.failed.push(SkipEntry::new(&dir, e));
                    continue;
                }
                if classification.has_fallback() {
                    warn!(
                        dir = ?destination,
                        description = record.image_type_text(),
                        "no rule matched on at least one axis"
                    );
                    summary.fallback_labels.push(destination.clone());
                }
                info!(from = ?dir, to = ?destination, "renamed series");
                summary.renamed.push(Renamed {
                    from: dir,
                    to: destination,
                });
            }
        }
    }

    info!(
        renamed = summary.renamed.len(),
        already_catalogued = summary.already_catalogued,
        collisions = summary.collisions.len(),
        unreadable = summary.unreadable.len(),
        "cataloguing finished"
    );
    Ok(summary)
}
