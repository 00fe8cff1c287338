//
// identity.rs
// CMR-Curate-rs
//
// Derives original patient identities from metadata and resolves them to stable anonymized identities.
//
// Thales Matheus Mendonça Santos - October 2026

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::StoreError;
use crate::models::DicomRecord;
use crate::store::{MappingEntry, MappingStore};

/// Lookup key derived from the PatientID of a file.
///
/// Name and birth date are left out: derived and secondary-capture series
/// often lack them or spell them differently, and they must still land on the
/// same patient. Only the SHA-256 is kept, so the plaintext never reaches the
/// mapping store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OriginalIdentity(String);

impl OriginalIdentity {
    /// Returns `None` when there is no PatientID to anchor the identity.
    pub fn from_patient_id(patient_id: &str) -> Option<Self> {
        let id = normalize(patient_id);
        if id.is_empty() {
            return None;
        }
        Some(Self(hex::encode(Sha256::digest(id.as_bytes()))))
    }

    pub fn from_record(record: &DicomRecord) -> Option<Self> {
        Self::from_patient_id(record.patient_id.as_deref()?)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Padding and repeated whitespace are encoding noise, not part of the ID.
fn normalize(value: &str) -> String {
    value
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Opaque, stable token replacing a patient's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnonymizedIdentity(String);

impl AnonymizedIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Per-patient date offset in `1..=max_days`, identical on every run.
    pub fn date_shift_days(&self, max_days: u32) -> u64 {
        let digest = Sha256::digest(format!("date-shift:{}", self.0).as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes) % u64::from(max_days.max(1)) + 1
    }
}

impl fmt::Display for AnonymizedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves original identities through a persistent [`MappingStore`].
///
/// The mapper rebuilds all of its state from the store when opened; new
/// identities are numbered after the highest index ever persisted, never from
/// a per-run counter.
pub struct IdentityMapper<S: MappingStore> {
    store: S,
    prefix: String,
    by_original: HashMap<String, AnonymizedIdentity>,
    taken: HashSet<String>,
    max_index: u64,
    created: usize,
}

impl<S: MappingStore> IdentityMapper<S> {
    pub fn open(mut store: S, prefix: impl Into<String>) -> Result<Self, StoreError> {
        let entries = store.load()?;
        let mut by_original = HashMap::with_capacity(entries.len());
        let mut taken = HashSet::with_capacity(entries.len());
        let mut max_index = 0;

        for entry in entries {
            max_index = max_index.max(entry.index);
            taken.insert(entry.anonymized.clone());
            by_original.insert(entry.original, AnonymizedIdentity(entry.anonymized));
        }

        Ok(Self {
            store,
            prefix: prefix.into(),
            by_original,
            taken,
            max_index,
            created: 0,
        })
    }

    /// Stored identity for `original`, or a new one persisted before returning.
    pub fn resolve(&mut self, original: &OriginalIdentity) -> Result<AnonymizedIdentity, StoreError> {
        if let Some(existing) = self.by_original.get(original.as_str()) {
            return Ok(existing.clone());
        }

        let mut index = self.max_index + 1;
        let mut candidate = self.token_for(index);
        while self.taken.contains(&candidate) {
            index += 1;
            candidate = self.token_for(index);
        }

        let entry = MappingEntry {
            original: original.as_str().to_string(),
            anonymized: candidate.clone(),
            index,
            created: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        // Nothing is recorded in memory unless the store accepted the entry.
        self.store.append(&entry)?;

        let anonymized = AnonymizedIdentity(candidate);
        self.max_index = index;
        self.taken.insert(entry.anonymized);
        self.by_original
            .insert(entry.original, anonymized.clone());
        self.created += 1;
        info!(identity = %anonymized, "new anonymized identity");
        Ok(anonymized)
    }

    /// Mark `token` as used when it has this mapper's `<prefix><digits>` shape.
    ///
    /// Used for pseudonyms that exist on disk but not in the store, e.g. after
    /// the store file was lost, so they are never handed to another patient.
    pub fn reserve(&mut self, token: &str) -> bool {
        let Some(index) = token
            .strip_prefix(self.prefix.as_str())
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u64>().ok())
        else {
            return false;
        };
        self.max_index = self.max_index.max(index);
        self.taken.insert(token.to_string())
    }

    pub fn lookup(&self, original: &OriginalIdentity) -> Option<&AnonymizedIdentity> {
        self.by_original.get(original.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_original.is_empty()
    }

    /// Identities minted since this mapper was opened.
    pub fn created_this_run(&self) -> usize {
        self.created
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn token_for(&self, index: u64) -> String {
        format!("{}{:06}", self.prefix, index)
    }
}
