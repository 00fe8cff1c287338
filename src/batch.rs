//
// batch.rs
// CMR-Curate-rs
//
// Shared directory discovery for the batch stages: deterministic file order, hidden entries and the stage's own output skipped.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::codec;
use crate::models::SkipEntry;

/// Files listed under a root, plus entries that could not be visited.
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkipEntry>,
}

/// Anonymizer input: `.dcm` (any case) or no extension at all.
pub fn is_anonymizer_input(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        None => true,
        Some(ext) => ext.eq_ignore_ascii_case("dcm"),
    }
}

/// Sorter input: `.dcm` or `.dcm.gz`.
pub fn is_sorter_input(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".dcm") || lower.ends_with(&format!(".{}", codec::COMPRESSED_EXTENSION))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Walk `root` recursively and return accepted files sorted by path.
///
/// `exclude` names a directory whose subtree is ignored, typically the stage
/// output when it lives inside its own input.
pub fn discover(root: &Path, exclude: Option<&Path>, accept: fn(&Path) -> bool) -> Discovery {
    let excluded = exclude.and_then(|p| fs::canonicalize(p).ok());
    let is_excluded = |entry: &DirEntry| {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && excluded
                .as_ref()
                .is_some_and(|ex| fs::canonicalize(entry.path()).is_ok_and(|p| &p == ex))
    };

    let mut discovery = Discovery::default();
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_hidden(e) && !is_excluded(e))
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() && accept(entry.path()) => {
                discovery.files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                warn!(?path, error = %e, "cannot visit entry");
                discovery.skipped.push(SkipEntry::new(path, e));
            }
        }
    }
    discovery.files.sort();
    info!(root = ?root, files = discovery.files.len(), "discovered input files");
    discovery
}

/// Log each skipped item so it is distinguishable from processed ones.
pub fn log_skips(stage: &str, skipped: &[SkipEntry]) {
    for entry in skipped {
        warn!(stage, path = ?entry.path, reason = %entry.reason, "skipped");
    }
}
