//! `scout scan` — run the acquisition engine and write reports.

use crate::acquisition::api::StopReason;
use crate::config::ScoutConfig;
use crate::error::ScanError;
use crate::orchestrator::Scanner;
use crate::report;
use anyhow::Result;
use clap::ValueEnum;
use std::path::Path;

/// Acquisition strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Prefer the API strategy, fall back to DOM extraction.
    Auto,
    /// Force endpoint discovery on (still falls back when nothing is found).
    Api,
    /// Skip endpoint discovery and drive the rendered page.
    Dom,
}

/// Run the scan command. Flag overrides beat config-file values.
pub async fn run(
    config_path: Option<&Path>,
    strategy: StrategyArg,
    dry_run: bool,
    max_pages: Option<u32>,
    out_dir: Option<&str>,
) -> Result<()> {
    let mut config = ScoutConfig::load(config_path)?;
    match strategy {
        StrategyArg::Auto => {}
        StrategyArg::Api => config.api.enabled = true,
        StrategyArg::Dom => config.api.enabled = false,
    }
    if dry_run {
        config.politeness.dry_run = true;
    }
    if let Some(n) = max_pages {
        config.api.max_pages = n;
    }
    if let Some(dir) = out_dir {
        config.output.dir = dir.to_string();
    }

    let scanner = Scanner::new(config.clone());
    let outcome = scanner.run().await?;

    // A fatal stop with nothing accumulated is a run failure; with partial
    // results the reports are still written.
    if outcome.hits.is_empty() {
        match outcome.stop {
            Some(StopReason::Halted { status }) => {
                return Err(ScanError::Halted { status }.into());
            }
            Some(StopReason::ErrorBudget { count }) => {
                return Err(ScanError::ErrorBudgetExhausted { count }.into());
            }
            _ => {}
        }
    }

    let written = report::write_reports(&outcome.hits, &config.output)?;

    println!(
        "Done. Hits: {} ({} strategy, {} pages, {} records seen)",
        outcome.hits.len(),
        outcome.strategy,
        outcome.pages,
        outcome.records_seen
    );
    if let Some(stop) = &outcome.stop {
        if stop.is_failure() {
            println!("Stopped early: {stop}");
        }
    }
    if let Some(path) = &written.json {
        println!("Saved: {}", path.display());
    }
    if let Some(path) = &written.csv {
        println!("Saved: {}", path.display());
    }

    Ok(())
}
