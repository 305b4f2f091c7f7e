//! `scout doctor` — check environment and diagnose issues.

use crate::config::ScoutConfig;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::path::Path;

/// Run the doctor command.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    println!("scout v{}", env!("CARGO_PKG_VERSION"));
    println!();

    match find_chromium() {
        Some(path) => println!("  ok   Chromium: {}", path.display()),
        None => {
            println!("  FAIL Chromium not found");
            println!("       Install Chrome/Chromium or set SCOUT_CHROMIUM_PATH.");
        }
    }

    match ScoutConfig::load(config_path) {
        Ok(config) => {
            println!(
                "  ok   config: target {:?}, {} max pages",
                config.target.url_hint,
                config.effective_max_pages()
            );
            match std::fs::create_dir_all(&config.output.dir) {
                Ok(()) => println!("  ok   output dir: {}", config.output.dir),
                Err(e) => println!("  FAIL output dir {}: {e}", config.output.dir),
            }
        }
        Err(e) => println!("  FAIL config: {e:#}"),
    }

    Ok(())
}
