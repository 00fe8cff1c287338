//
// error.rs
// CMR-Curate-rs
//
// Typed error taxonomy shared by the pipeline stages: store integrity, per-file failures, renames, config and rules.
//
// Thales Matheus Mendonça Santos - October 2026

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the persistent identity mapping store.
///
/// Any variant here is fatal for an anonymization run: identity continuity
/// cannot be guaranteed once the store is unreadable or cannot be extended.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("mapping store {path:?} is corrupt at line {line}: {reason}")]
    Corruption {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("mapping store {path:?} could not be read: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("mapping store {path:?} could not be extended: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode mapping entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Per-file failures. These are isolated: the file is skipped and reported.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("{path:?} is not a readable DICOM file: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("{path:?} has no PatientID to derive an identity from")]
    MissingIdentity { path: PathBuf },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode {path:?}: {reason}")]
    Encode { path: PathBuf, reason: String },
}

impl FileError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        FileError::Unreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FileError::Write {
            path: path.into(),
            source,
        }
    }
}

/// Failures while renaming series directories in place.
#[derive(Error, Debug)]
pub enum CatalogueError {
    #[error("cannot rename {from:?} to {to:?}: destination name is already taken")]
    NameCollision { from: PathBuf, to: PathBuf },

    #[error("no readable DICOM file in {dir:?}")]
    NoReadableFile { dir: PathBuf },

    #[error("failed to rename {from:?}: {source}")]
    Rename {
        from: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("failed to read rule table {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid rule table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid label {label:?}: {reason}")]
    InvalidLabel { label: String, reason: &'static str },

    #[error("invalid pattern for label {label:?}: {source}")]
    Pattern {
        label: String,
        #[source]
        source: regex::Error,
    },
}
