//
// lib.rs
// CMR-Curate-rs
//
// Exposes the pipeline stages and their shared collaborators for both the binary and library consumers.
//
// Thales Matheus Mendonça Santos - October 2026

// Each stage module mirrors a CLI verb; the rest are shared collaborators.
pub mod anonymize;
pub mod batch;
pub mod catalogue;
pub mod classify;
pub mod cli;
pub mod codec;
pub mod config;
pub mod describe;
pub mod dicom_access;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod models;
pub mod sort;
pub mod store;
pub mod validate;

pub use anonymize::Anonymizer;
pub use classify::{Classification, Classifier};
pub use cli::{run as run_cli, Cli, Commands};
pub use config::Config;
pub use identity::{AnonymizedIdentity, IdentityMapper, OriginalIdentity};
pub use sort::SeriesSorter;
pub use store::{JsonLinesStore, MappingStore, MemoryStore};
