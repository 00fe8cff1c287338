//
// sort.rs
// CMR-Curate-rs
//
// Groups anonymized files into per-series directories, decompressing them on the way; re-running over a sorted tree changes nothing.
//
// Thales Matheus Mendonça Santos - October 2026

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::batch;
use crate::catalogue::{self, SERIES_PREFIX};
use crate::codec;
use crate::error::FileError;
use crate::metadata;
use crate::models::{SkipEntry, SortSummary};

/// Fallback bucket for files without a usable SeriesNumber.
pub const UNSORTED_DIR: &str = "Unsorted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortOutcome {
    Sorted(PathBuf),
    AlreadySorted(PathBuf),
    Unsorted(PathBuf),
    Conflict(PathBuf),
}

/// Sorts one tree; caches the series directories already present per study folder.
#[derive(Debug, Default)]
pub struct SeriesSorter {
    series_dirs: HashMap<PathBuf, BTreeMap<u32, String>>,
}

impl SeriesSorter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(&mut self, source: &Path, target: &Path) -> Result<SortSummary> {
        anyhow::ensure!(source.is_dir(), "{source:?} is not a directory");
        let exclude = (source != target).then_some(target);
        let discovery = batch::discover(source, exclude, batch::is_sorter_input);
        let mut summary = SortSummary {
            skipped: discovery.skipped,
            ..Default::default()
        };

        let scanned: Vec<(PathBuf, Result<Option<u32>, FileError>)> = discovery
            .files
            .par_iter()
            .map(|path| {
                let series = metadata::read_record(path).map(|r| r.series_number);
                (path.clone(), series)
            })
            .collect();

        for (path, series) in scanned {
            let series = match series {
                Ok(series) => series,
                Err(e) => {
                    summary.skipped.push(SkipEntry::new(&path, e));
                    continue;
                }
            };
            match self.place(source, target, &path, series) {
                Ok(SortOutcome::Sorted(dest)) => {
                    debug!(?path, ?dest, "sorted");
                    summary.sorted += 1;
                }
                Ok(SortOutcome::AlreadySorted(dest)) => {
                    debug!(?path, ?dest, "already sorted");
                    summary.already_sorted += 1;
                }
                Ok(SortOutcome::Unsorted(dest)) => {
                    warn!(?path, ?dest, "no series number; placed in fallback bucket");
                    summary.unsorted.push(dest);
                }
                Ok(SortOutcome::Conflict(dest)) => {
                    warn!(?path, ?dest, "destination holds different content; left untouched");
                    summary
                        .conflicts
                        .push(SkipEntry::new(&path, format!("conflicts with {}", dest.display())));
                }
                Err(e) => summary.skipped.push(SkipEntry::new(&path, e)),
            }
        }

        batch::log_skips("sort", &summary.skipped);
        info!(
            sorted = summary.sorted,
            already_sorted = summary.already_sorted,
            unsorted = summary.unsorted.len(),
            conflicts = summary.conflicts.len(),
            skipped = summary.skipped.len(),
            "sorting finished"
        );
        Ok(summary)
    }

    /// Copy one file to its series directory, decompressed.
    pub fn place(
        &mut self,
        source: &Path,
        target: &Path,
        path: &Path,
        series_number: Option<u32>,
    ) -> Result<SortOutcome, FileError> {
        let study = target.join(study_folder(source, path));
        let series_dir = match series_number {
            Some(number) => self.series_dir_name(&study, number),
            None => UNSORTED_DIR.to_string(),
        };
        let stem = codec::dicom_stem(path)
            .ok_or_else(|| FileError::unreadable(path, "file name is not valid UTF-8"))?;
        let destination = study.join(series_dir).join(format!("{stem}.dcm"));

        let outcome = |dest: PathBuf, placed: bool| match (series_number, placed) {
            (None, _) => SortOutcome::Unsorted(dest),
            (Some(_), true) => SortOutcome::Sorted(dest),
            (Some(_), false) => SortOutcome::AlreadySorted(dest),
        };

        if same_file(path, &destination) {
            return Ok(outcome(destination, false));
        }
        let bytes = codec::read_bytes(path)?;
        if destination.exists() {
            let existing = fs::read(&destination).map_err(|e| FileError::unreadable(&destination, e))?;
            if existing == bytes {
                return Ok(outcome(destination, false));
            }
            return Ok(SortOutcome::Conflict(destination));
        }
        codec::write_plain(&destination, &bytes)?;
        Ok(outcome(destination, true))
    }

    // Reuse whatever directory already holds this series (bare or catalogued),
    // so sorting into an existing tree never splits a series in two.
    fn series_dir_name(&mut self, study: &Path, number: u32) -> String {
        let known = self
            .series_dirs
            .entry(study.to_path_buf())
            .or_insert_with(|| existing_series_dirs(study));
        known
            .entry(number)
            .or_insert_with(|| format!("{SERIES_PREFIX}{number}"))
            .clone()
    }
}

pub fn sort_tree(source: &Path, target: &Path) -> Result<SortSummary> {
    SeriesSorter::new().sort(source, target)
}

fn existing_series_dirs(study: &Path) -> BTreeMap<u32, String> {
    let mut names: Vec<String> = fs::read_dir(study)
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();

    let mut dirs = BTreeMap::new();
    for name in names {
        if let Some(number) = catalogue::series_number_of(&name) {
            dirs.entry(number).or_insert(name);
        }
    }
    dirs
}

/// Parent of `path` relative to `source`, minus a trailing series or fallback directory.
fn study_folder(source: &Path, path: &Path) -> PathBuf {
    let relative = path
        .strip_prefix(source)
        .ok()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let is_bucket = relative
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n == UNSORTED_DIR || catalogue::series_number_of(n).is_some());
    if is_bucket {
        relative.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        relative
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
