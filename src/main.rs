//
// main.rs
// CMR-Curate-rs
//
// Binary entry point that hands off execution to the CLI layer.
//
// Thales Matheus Mendonça Santos - October 2026

use cmr_curate::cli;

fn main() -> anyhow::Result<()> {
    // Argument parsing, logging setup and dispatch all live in the CLI module.
    cli::run()
}
