//
// store.rs
// CMR-Curate-rs
//
// Persistent identity mapping store: an append-only JSON Lines file, plus an in-memory variant for tests and dry runs.
//
// Thales Matheus Mendonça Santos - October 2026

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;

/// One persisted resolution `original -> anonymized`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingEntry {
    pub original: String,
    pub anonymized: String,
    pub index: u64,
    pub created: String,
}

/// Load/persist contract the identity mapper is written against.
pub trait MappingStore {
    /// Every entry persisted so far, in insertion order.
    fn load(&mut self) -> Result<Vec<MappingEntry>, StoreError>;

    /// Durably record one new entry. Must not return before the entry is persisted.
    fn append(&mut self, entry: &MappingEntry) -> Result<(), StoreError>;
}

/// Append-only JSON Lines file; never truncated or rewritten.
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    path: PathBuf,
    needs_separator: bool,
}

impl JsonLinesStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            needs_separator: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corruption(&self, line: usize, reason: impl Into<String>) -> StoreError {
        StoreError::Corruption {
            path: self.path.clone(),
            line,
            reason: reason.into(),
        }
    }
}

impl MappingStore for JsonLinesStore {
    fn load(&mut self) -> Result<Vec<MappingEntry>, StoreError> {
        let text = match fs::read(&self.path) {
            Ok(bytes) => String::from_utf8(bytes).map_err(|_| self.corruption(0, "not UTF-8"))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = ?self.path, "no mapping store yet; starting empty");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut entries = Vec::new();
        let mut by_original: HashMap<String, String> = HashMap::new();
        let mut seen_values = HashSet::new();
        let mut seen_indices = HashSet::new();

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let entry: MappingEntry = serde_json::from_str(line)
                .map_err(|e| self.corruption(line_no, e.to_string()))?;

            if entry.original.is_empty() || entry.anonymized.is_empty() {
                return Err(self.corruption(line_no, "empty key or value"));
            }
            if let Some(previous) = by_original.get(&entry.original) {
                let reason = if *previous == entry.anonymized {
                    "duplicate entry for an original identity"
                } else {
                    "original identity mapped to two anonymized identities"
                };
                return Err(self.corruption(line_no, reason));
            }
            if !seen_values.insert(entry.anonymized.clone()) {
                return Err(self.corruption(
                    line_no,
                    format!("anonymized identity {} is shared by two originals", entry.anonymized),
                ));
            }
            if !seen_indices.insert(entry.index) {
                return Err(self.corruption(line_no, format!("index {} used twice", entry.index)));
            }

            by_original.insert(entry.original.clone(), entry.anonymized.clone());
            entries.push(entry);
        }

        self.needs_separator = !text.is_empty() && !text.ends_with('\n');
        debug!(path = ?self.path, entries = entries.len(), "mapping store loaded");
        Ok(entries)
    }

    fn append(&mut self, entry: &MappingEntry) -> Result<(), StoreError> {
        let to_append_err = |source| StoreError::Append {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(to_append_err)?;
        }

        let mut line = String::new();
        if self.needs_separator {
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(entry)?);
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(to_append_err)?;
        // One write per entry, then flush to disk before any dependent output exists.
        file.write_all(line.as_bytes()).map_err(to_append_err)?;
        file.sync_data().map_err(to_append_err)?;

        self.needs_separator = false;
        Ok(())
    }
}

/// Store kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Vec<MappingEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<MappingEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }
}

impl MappingStore for MemoryStore {
    fn load(&mut self) -> Result<Vec<MappingEntry>, StoreError> {
        Ok(self.entries.clone())
    }

    fn append(&mut self, entry: &MappingEntry) -> Result<(), StoreError> {
        self.entries.push(entry.clone());
        Ok(())
    }
}
