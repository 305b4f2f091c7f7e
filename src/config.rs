//! Configuration surface, loaded once at startup and read-only for the run.
//!
//! All tuning lives in a single TOML file (default `scout.toml`). Every
//! section has working defaults, so a missing file still yields a usable
//! scan against the default target.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "scout.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoutConfig {
    /// Dedup behavior of the result sink.
    pub dedup_mode: crate::sink::DedupMode,
    pub target: TargetConfig,
    pub selectors: Selectors,
    pub filters: FilterConfig,
    pub profit: ProfitModel,
    pub scroll: ScrollConfig,
    pub output: OutputConfig,
    pub browser: BrowserConfig,
    pub api: ApiConfig,
    pub politeness: PolitenessConfig,
}

impl ScoutConfig {
    /// Load configuration from `path`, or from `scout.toml` when no path is
    /// given. An explicitly named file must exist; the default file is
    /// optional and falls back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Path::new(DEFAULT_CONFIG_FILE).to_path_buf(), false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("config file not found: {}", path.display());
            }
            tracing::debug!("no {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Page budget for one run: the API strategy's own cap bounded by the
    /// politeness per-run cap.
    pub fn effective_max_pages(&self) -> u32 {
        self.api.max_pages.min(self.politeness.max_pages_per_run)
    }
}

/// How the right surface (tab) is identified among open candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// Substring a candidate surface URL should contain.
    pub url_hint: String,
    /// Known trade-page URL shape (regex).
    pub url_pattern: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url_hint: "skinsmonkey.com/trade".into(),
            url_pattern: r"skinsmonkey\.com/trade".into(),
        }
    }
}

/// CSS selectors for the rendered item grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Selectors {
    pub card: String,
    pub item_image: String,
    pub name: String,
    pub price: String,
    pub sticker_images: String,
    /// Scroll-container candidates, tried in order.
    pub scroll_container: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            card: ".item-card".into(),
            item_image: ".item-card__image, .item-image.item-card__image, .item-thumb img".into(),
            name: ".item-card__title, .itemName".into(),
            price: ".item-card__price.item-price, .item-price.item-card__price".into(),
            sticker_images: ".item-card__stickers img[alt], .item-card-stickers img[alt]".into(),
            scroll_container: ".inventory-grid-row, .vue-recycle-scroller__item-view".into(),
        }
    }
}

/// Sticker matching mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StickerMode {
    Any,
    All,
    Regex,
}

/// In-process item filter thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sticker_mode: StickerMode,
    pub sticker_terms: Vec<String>,
    pub sticker_regex: Option<String>,
    pub min_sticker_count: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_price: Some(2.0),
            max_price: Some(65.0),
            sticker_mode: StickerMode::Any,
            sticker_terms: vec!["Holo".into(), "stockholm".into()],
            sticker_regex: None,
            min_sticker_count: 1,
        }
    }
}

/// Five sequential multiplicative adjustments applied to a purchase price.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfitModel {
    pub enabled: bool,
    pub base_spread_gain: f64,
    pub sticker_uplift: f64,
    pub steam_fee: f64,
    pub sale_discount: f64,
    pub hardcode_cut: f64,
}

impl Default for ProfitModel {
    fn default() -> Self {
        Self {
            enabled: true,
            base_spread_gain: 0.35,
            sticker_uplift: 0.25,
            steam_fee: 0.15,
            sale_discount: 0.35,
            hardcode_cut: 0.10,
        }
    }
}

/// Virtualized-list scrolling tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScrollConfig {
    pub max_batches: u32,
    pub per_batch_px: u32,
    pub wait_between_ms: u64,
    /// Consecutive no-growth batches before stopping early.
    pub early_stop_if_no_new: u32,
    /// Bounded wait for the first item marker; a timeout is not fatal.
    pub marker_wait_ms: u64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            max_batches: 40,
            per_batch_px: 1100,
            wait_between_ms: 500,
            early_stop_if_no_new: 4,
            marker_wait_ms: 15_000,
        }
    }
}

/// Terminal ordering of the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Roi,
    Price,
    None,
}

/// Output directory and format toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: String,
    pub file_prefix: String,
    /// Print each accepted hit as an NDJSON line as it is found.
    pub stream_hits: bool,
    pub save_json: bool,
    pub save_csv: bool,
    pub sort_by: SortBy,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "out".into(),
            file_prefix: "skinsmonkey".into(),
            stream_hits: true,
            save_json: true,
            save_csv: true,
            sort_by: SortBy::Roi,
        }
    }
}

/// Browser setup: launch a headless instance or attach to a running one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserConfig {
    pub headless: bool,
    /// When set, attach over CDP instead of launching; an attached browser is
    /// never closed by the run.
    pub connect_ws_endpoint: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            connect_ws_endpoint: None,
            viewport_width: 1440,
            viewport_height: 900,
            args: vec!["--no-sandbox".into(), "--disable-setuid-sandbox".into()],
        }
    }
}

/// Paginated-endpoint acquisition tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub enabled: bool,
    /// Fixed endpoint base URL; when unset the endpoint is discovered by
    /// observing the surface's network traffic.
    pub endpoint: Option<String>,
    /// Response-URL pattern retained during passive discovery (regex).
    pub discovery_pattern: String,
    pub discovery_window_ms: u64,
    pub limit_param: String,
    pub offset_param: String,
    pub page_size: u32,
    pub start_offset: u64,
    pub max_pages: u32,
    /// Multiplier converting configured decimal prices into the endpoint's
    /// native integer unit (cents per dollar).
    pub price_factor: f64,
    /// Attach translated price bounds to page URLs. Optimization only; the
    /// in-process filter stays authoritative.
    pub server_price_filter: bool,
    pub price_min_param: String,
    pub price_max_param: String,
    /// Fixed query parameters attached to every page URL.
    pub extra_params: BTreeMap<String, String>,
    /// Extra outbound headers merged over the built-in defaults.
    pub headers: BTreeMap<String, String>,
    /// Replay a blocked request once through the surface's own session.
    pub session_fallback: bool,
    /// Attach the surface's cookies to direct requests.
    pub use_session_cookies: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            discovery_pattern: r"/api/.*(inventory|item|market)".into(),
            discovery_window_ms: 8_000,
            limit_param: "limit".into(),
            offset_param: "offset".into(),
            page_size: 60,
            start_offset: 0,
            max_pages: 50,
            price_factor: 100.0,
            server_price_filter: true,
            price_min_param: "priceMin".into(),
            price_max_param: "priceMax".into(),
            extra_params: BTreeMap::from([
                ("appId".to_string(), "730".to_string()),
                ("sort".to_string(), "-price".to_string()),
            ]),
            headers: BTreeMap::new(),
            session_fallback: true,
            use_session_cookies: false,
        }
    }
}

/// Self-imposed pacing, backoff, and halt rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolitenessConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
    pub requests_per_minute: u32,
    pub max_pages_per_run: u32,
    /// Statuses that stop the run outright on first occurrence.
    pub stop_on_http: Vec<u16>,
    pub backoff_ms: u64,
    pub max_consecutive_errors: u32,
    /// Build and log page URLs without issuing any request.
    pub dry_run: bool,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 800,
            max_delay_ms: 2_000,
            jitter_ms: 400,
            requests_per_minute: 30,
            max_pages_per_run: 25,
            stop_on_http: vec![401, 403],
            backoff_ms: 5_000,
            max_consecutive_errors: 3,
            dry_run: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let cfg = ScoutConfig::default();
        assert!(cfg.politeness.min_delay_ms <= cfg.politeness.max_delay_ms);
        assert_eq!(cfg.effective_max_pages(), 25);
        assert!(cfg.api.price_factor > 0.0);
        assert_eq!(cfg.filters.sticker_mode, StickerMode::Any);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let cfg: ScoutConfig = toml::from_str(
            r#"
            [filters]
            min_price = 5.0
            sticker_mode = "all"
            sticker_terms = ["Holo", "Foil"]

            [politeness]
            dry_run = true
            stop_on_http = [401, 403, 451]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.filters.min_price, Some(5.0));
        assert_eq!(cfg.filters.sticker_mode, StickerMode::All);
        assert!(cfg.politeness.dry_run);
        assert_eq!(cfg.politeness.stop_on_http, vec![401, 403, 451]);
        // Untouched sections keep defaults.
        assert_eq!(cfg.scroll.max_batches, 40);
        assert_eq!(cfg.api.page_size, 60);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let parsed = toml::from_str::<ScoutConfig>("[filters]\nmin_prcie = 5.0\n");
        assert!(parsed.is_err());
    }
}
