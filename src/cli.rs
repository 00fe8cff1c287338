//
// cli.rs
// CMR-Curate-rs
//
// Defines the CLI surface with Clap, sets up logging and dispatches each pipeline stage.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::anonymize;
use crate::catalogue;
use crate::classify::Classifier;
use crate::config::Config;
use crate::describe;
use crate::models::{AnonymizeSummary, CatalogueSummary, SkipEntry, SortSummary, ValidationReport};
use crate::sort;
use crate::store::JsonLinesStore;
use crate::validate;

/// Command-line interface glue code: defines the pipeline stages and dispatches to modules.
#[derive(Parser)]
#[command(name = "cmr-curate")]
#[command(about = "Anonymize, sort and catalogue cardiac MRI DICOM collections", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "CMR_CURATE_CONFIG")]
    pub config: Option<PathBuf>,
    /// Identity mapping store, overriding the configured path
    #[arg(long, global = true)]
    pub mapping_store: Option<PathBuf>,
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Anonymize a directory of DICOM files into compressed, per-patient output
    Anonymize {
        #[arg(short, long)]
        source: PathBuf,
        #[arg(short, long)]
        target: PathBuf,
    },
    /// Sort anonymized files into per-series directories
    Sort {
        #[arg(short, long)]
        source: PathBuf,
        #[arg(short, long)]
        target: PathBuf,
    },
    /// Rename sorted series directories in place after their classification
    Catalog {
        #[arg(short, long)]
        source: PathBuf,
    },
    /// Compare per-patient file counts of an anonymized and a sorted tree
    Validate {
        #[arg(short, long)]
        source: PathBuf,
        #[arg(short, long)]
        target: PathBuf,
    },
    /// List distinct series descriptions and how they are classified
    Describe {
        #[arg(short, long)]
        source: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Show which descriptions each patient folder has instead of the label table
        #[arg(long)]
        per_patient: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A second initialisation (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(store) = cli.mapping_store {
        config.mapping_store = store;
    }

    match cli.command {
        Commands::Anonymize { source, target } => {
            let store = JsonLinesStore::new(&config.mapping_store);
            let summary = anonymize::anonymize_tree(store, &config, &source, &target)?;
            print_anonymize(&summary);
        }
        Commands::Sort { source, target } => {
            let summary = sort::sort_tree(&source, &target)?;
            print_sort(&summary);
        }
        Commands::Catalog { source } => {
            let classifier = load_classifier(&config)?;
            let summary = catalogue::catalogue(&source, &classifier)?;
            print_catalogue(&summary);
            if !summary.collisions.is_empty() {
                bail!(
                    "{} series director{} could not be renamed because of name collisions",
                    summary.collisions.len(),
                    if summary.collisions.len() == 1 { "y" } else { "ies" }
                );
            }
        }
        Commands::Validate { source, target } => {
            let report = validate::validate_sorted(&source, &target)?;
            print_validation(&report);
            if !report.is_clean() {
                bail!("sorted tree {target:?} does not match {source:?}");
            }
        }
        Commands::Describe {
            source,
            output,
            per_patient: true,
        } => {
            let overview = describe::sequence_overview(&source)?;
            match output {
                Some(path) => write_json(&path, &overview)?,
                None => print!("{}", describe::render_overview(&overview)),
            }
        }
        Commands::Describe { source, output, .. } => {
            let classifier = load_classifier(&config)?;
            let rows = describe::describe(&source, &classifier)?;
            match output {
                Some(path) => write_json(&path, &rows)?,
                None => print!("{}", describe::render_table(&rows)),
            }
        }
    }

    Ok(())
}

fn load_classifier(config: &Config) -> anyhow::Result<Classifier> {
    Classifier::load(config.rules.as_deref()).context("Failed to load classification rules")
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {path:?}"))?;
    println!("Report saved to {:?}", path);
    Ok(())
}

fn print_skips(label: &str, entries: &[SkipEntry]) {
    for entry in entries {
        println!("  {label}: {} ({})", entry.path.display(), entry.reason);
    }
}

fn print_anonymize(summary: &AnonymizeSummary) {
    println!("Anonymization summary");
    println!("  anonymized:          {}", summary.anonymized);
    println!("  already anonymized:  {}", summary.already_anonymized);
    println!("  new identities:      {}", summary.new_identities);
    println!("  skipped:             {}", summary.skipped.len());
    print_skips("skipped", &summary.skipped);
}

fn print_sort(summary: &SortSummary) {
    println!("Sort summary");
    println!("  sorted:          {}", summary.sorted);
    println!("  already sorted:  {}", summary.already_sorted);
    println!("  unsorted:        {}", summary.unsorted.len());
    println!("  conflicts:       {}", summary.conflicts.len());
    println!("  skipped:         {}", summary.skipped.len());
    for path in &summary.unsorted {
        println!("  unsorted: {}", path.display());
    }
    print_skips("conflict", &summary.conflicts);
    print_skips("skipped", &summary.skipped);
}

fn print_catalogue(summary: &CatalogueSummary) {
    println!("Catalogue summary");
    println!("  renamed:             {}", summary.renamed.len());
    println!("  already catalogued:  {}", summary.already_catalogued);
    println!("  with Other label:    {}", summary.fallback_labels.len());
    println!("  collisions:          {}", summary.collisions.len());
    println!("  unreadable:          {}", summary.unreadable.len());
    println!("  failed:              {}", summary.failed.len());
    for renamed in &summary.renamed {
        println!("  {} -> {}", renamed.from.display(), renamed.to.display());
    }
    for path in &summary.fallback_labels {
        println!("  other label: {}", path.display());
    }
    print_skips("collision", &summary.collisions);
    print_skips("unreadable", &summary.unreadable);
    print_skips("failed", &summary.failed);
}

fn print_validation(report: &ValidationReport) {
    println!("Validation of {} patient folders", report.checked_folders);
    for folder in &report.missing_in_target {
        println!("  missing in sorted tree: {folder}");
    }
    for folder in &report.only_in_target {
        println!("  only in sorted tree:    {folder}");
    }
    for m in &report.mismatches {
        println!(
            "  {}: {} anonymized files, {} sorted files",
            m.folder, m.source_files, m.target_files
        );
    }
    if report.is_clean() {
        println!("  OK");
    }
}
