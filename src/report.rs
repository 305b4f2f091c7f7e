//! Report writer: persists the final result set as JSON and/or CSV.
//!
//! Filenames are timestamped so successive runs never clobber each other;
//! the output directory is created on demand.

use crate::config::OutputConfig;
use crate::model::ScannedHit;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Paths of the files written for one run.
#[derive(Debug, Default)]
pub struct WrittenReports {
    pub json: Option<PathBuf>,
    pub csv: Option<PathBuf>,
}

/// Write the configured report files for `hits`.
pub fn write_reports(hits: &[ScannedHit], cfg: &OutputConfig) -> Result<WrittenReports> {
    let mut written = WrittenReports::default();
    if !cfg.save_json && !cfg.save_csv {
        return Ok(written);
    }

    let dir = Path::new(&cfg.dir);
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    let stamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S");

    if cfg.save_json {
        let path = dir.join(format!("{}-{stamp}.json", cfg.file_prefix));
        let body = serde_json::to_string_pretty(hits)?;
        std::fs::write(&path, body)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.json = Some(path);
    }

    if cfg.save_csv {
        let path = dir.join(format!("{}-{stamp}.csv", cfg.file_prefix));
        std::fs::write(&path, to_csv(hits))
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.csv = Some(path);
    }

    Ok(written)
}

fn to_csv(hits: &[ScannedHit]) -> String {
    let mut lines = vec!["name,price,stickers,roi,absProfit".to_string()];
    for hit in hits {
        let price = hit.price.map(|p| p.to_string()).unwrap_or_default();
        let roi = hit
            .profit
            .as_ref()
            .and_then(|p| p.roi)
            .map(|r| r.to_string())
            .unwrap_or_default();
        let absolute = hit
            .profit
            .as_ref()
            .map(|p| p.absolute.to_string())
            .unwrap_or_default();
        lines.push(format!(
            "{},{price},{},{roi},{absolute}",
            quote(&hit.name),
            quote(&hit.sticker_column()),
        ));
    }
    lines.join("\n")
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
