// Copyright 2026 Sticker Scout Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use sticker_scout::cli;
use sticker_scout::cli::scan_cmd::StrategyArg;

#[derive(Parser)]
#[command(
    name = "scout",
    about = "Sticker Scout — marketplace sticker scanner",
    version,
    after_help = "Run 'scout <command> --help' for details on each command."
)]
struct Cli {
    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the marketplace and write profit-ranked reports
    Scan {
        /// Config file (TOML); defaults to scout.toml when present
        #[arg(long)]
        config: Option<PathBuf>,
        /// Acquisition strategy
        #[arg(long, value_enum, default_value = "auto")]
        strategy: StrategyArg,
        /// Build and log page URLs without issuing any request
        #[arg(long)]
        dry_run: bool,
        /// Override the page budget for this run
        #[arg(long)]
        max_pages: Option<u32>,
        /// Override the output directory
        #[arg(long)]
        out: Option<String>,
    },
    /// Check environment and diagnose issues
    Doctor {
        /// Config file (TOML); defaults to scout.toml when present
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "sticker_scout=debug"
    } else if cli.quiet {
        "sticker_scout=warn"
    } else {
        "sticker_scout=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Scan {
            config,
            strategy,
            dry_run,
            max_pages,
            out,
        } => {
            cli::scan_cmd::run(
                config.as_deref(),
                strategy,
                dry_run,
                max_pages,
                out.as_deref(),
            )
            .await
        }
        Commands::Doctor { config } => cli::doctor::run(config.as_deref()).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "scout", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    result
}
