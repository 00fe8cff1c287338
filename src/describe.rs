//
// describe.rs
// CMR-Curate-rs
//
// Lists the distinct series descriptions of a sorted tree with the labels the rule table gives them.
//
// Thales Matheus Mendonça Santos - October 2026

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::catalogue;
use crate::classify::Classifier;
use crate::models::{DescriptionRow, PatientSequences, SequenceOverview};

pub fn describe(sorted_root: &Path, classifier: &Classifier) -> Result<Vec<DescriptionRow>> {
    anyhow::ensure!(sorted_root.is_dir(), "{sorted_root:?} is not a directory");

    let descriptions: Vec<String> = catalogue::series_directories(sorted_root)
        .par_iter()
        .filter_map(|dir| match catalogue::representative_record(dir) {
            Ok(record) => Some(record.image_type_text().to_string()),
            Err(e) => {
                warn!(error = %e, "series ignored");
                None
            }
        })
        .collect();

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for description in descriptions {
        *counts.entry(description).or_default() += 1;
    }

    let rows: Vec<DescriptionRow> = counts
        .into_iter()
        .map(|(description, count)| {
            let c = classifier.classify(&description, &description);
            DescriptionRow {
                description,
                count,
                image_type: c.image_type.label,
                image_type_match: c.image_type.matched,
                anatomy: c.anatomy.label,
                anatomy_match: c.anatomy.matched,
            }
        })
        .collect();
    info!(descriptions = rows.len(), "description report built");
    Ok(rows)
}

/// Plain-text table, one description per line.
pub fn render_table(rows: &[DescriptionRow]) -> String {
    let width = rows
        .iter()
        .map(|r| r.description.chars().count())
        .max()
        .unwrap_or(0)
        .max("DESCRIPTION".len());
    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  {:>5}  {:<16}  ANATOMY", "DESCRIPTION", "COUNT", "IMAGE TYPE");
    for row in rows {
        let description = display_description(&row.description);
        let _ = writeln!(
            out,
            "{:<width$}  {:>5}  {:<16}  {} ({:?})",
            description,
            row.count,
            format!("{} ({:?})", row.image_type, row.image_type_match),
            row.anatomy,
            row.anatomy_match
        );
    }
    out
}

/// Patient folders against series descriptions, marked present or absent.
pub fn sequence_overview(sorted_root: &Path) -> Result<SequenceOverview> {
    anyhow::ensure!(sorted_root.is_dir(), "{sorted_root:?} is not a directory");

    let mut patients: Vec<String> = fs::read_dir(sorted_root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.'))
        .collect();
    patients.sort();

    let seen: Vec<(String, String)> = catalogue::series_directories(sorted_root)
        .par_iter()
        .filter_map(|dir| {
            let patient = patient_of(sorted_root, dir)?;
            match catalogue::representative_record(dir) {
                Ok(record) => Some((patient, record.image_type_text().to_string())),
                Err(e) => {
                    warn!(error = %e, "series ignored");
                    None
                }
            }
        })
        .collect();

    let descriptions: Vec<String> = seen
        .iter()
        .map(|(_, d)| d.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let present: BTreeSet<(String, String)> = seen.into_iter().collect();

    let patients = patients
        .into_iter()
        .map(|patient| PatientSequences {
            present: descriptions
                .iter()
                .map(|d| u8::from(present.contains(&(patient.clone(), d.clone()))))
                .collect(),
            patient,
        })
        .collect();
    Ok(SequenceOverview {
        descriptions,
        patients,
    })
}

fn patient_of(root: &Path, dir: &Path) -> Option<String> {
    let relative: PathBuf = dir.strip_prefix(root).ok()?.to_path_buf();
    relative
        .components()
        .next()
        .and_then(|c| c.as_os_str().to_str())
        .filter(|_| relative.components().count() > 1)
        .map(str::to_string)
}

/// Plain-text matrix, one patient per line.
pub fn render_overview(overview: &SequenceOverview) -> String {
    let width = overview
        .patients
        .iter()
        .map(|p| p.patient.chars().count())
        .max()
        .unwrap_or(0)
        .max("PATIENT".len());
    let mut out = String::new();
    let _ = write!(out, "{:<width$}", "PATIENT");
    for description in &overview.descriptions {
        let _ = write!(out, "  {}", display_description(description));
    }
    out.push('\n');
    for patient in &overview.patients {
        let _ = write!(out, "{:<width$}", patient.patient);
        for (flag, description) in patient.present.iter().zip(&overview.descriptions) {
            let column = display_description(description).chars().count();
            let _ = write!(out, "  {:<column$}", flag);
        }
        out.push('\n');
    }
    out
}

fn display_description(description: &str) -> &str {
    if description.is_empty() {
        "(none)"
    } else {
        description
    }
}
