//! Match & score filter: pure predicates over canonical items plus the
//! profit model.

use crate::config::{FilterConfig, ProfitModel, StickerMode};
use crate::model::{ProfitEstimate, RawItem, Sticker};
use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Compiled filter. Built once per run so the sticker regex compiles once.
#[derive(Debug)]
pub struct ItemFilter {
    min_price: Option<f64>,
    max_price: Option<f64>,
    mode: StickerMode,
    terms: Vec<String>,
    regex: Option<Regex>,
    min_count: usize,
}

impl ItemFilter {
    pub fn new(cfg: &FilterConfig) -> Self {
        let regex = match (cfg.sticker_mode, cfg.sticker_regex.as_deref()) {
            (StickerMode::Regex, Some(pattern)) => {
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(rx) => Some(rx),
                    Err(e) => {
                        // An unusable pattern must not block the scan.
                        warn!("invalid sticker regex {pattern:?} ({e}); sticker gate passes all");
                        None
                    }
                }
            }
            _ => None,
        };

        Self {
            min_price: cfg.min_price,
            max_price: cfg.max_price,
            mode: cfg.sticker_mode,
            terms: cfg.sticker_terms.iter().map(|t| t.to_lowercase()).collect(),
            regex,
            min_count: cfg.min_sticker_count,
        }
    }

    pub fn matches(&self, item: &RawItem) -> bool {
        price_match(item.price, self.min_price, self.max_price) && self.stickers_match(&item.stickers)
    }

    fn stickers_match(&self, stickers: &[Sticker]) -> bool {
        if stickers.len() < self.min_count {
            return false;
        }

        if self.mode == StickerMode::Regex {
            return match &self.regex {
                Some(rx) => stickers.iter().any(|s| rx.is_match(&s.name)),
                None => true,
            };
        }

        if self.terms.is_empty() {
            return true;
        }

        let lower: Vec<String> = stickers.iter().map(|s| s.name.to_lowercase()).collect();
        match self.mode {
            StickerMode::All => self
                .terms
                .iter()
                .all(|t| lower.iter().any(|s| s.contains(t))),
            _ => self
                .terms
                .iter()
                .any(|t| lower.iter().any(|s| s.contains(t))),
        }
    }
}

/// Bound check. An unknown price fails any configured bound; with no bounds
/// at all it passes.
pub fn price_match(price: Option<f64>, min: Option<f64>, max: Option<f64>) -> bool {
    let Some(price) = price else {
        return min.is_none() && max.is_none();
    };
    if min.is_some_and(|m| price < m) {
        return false;
    }
    if max.is_some_and(|m| price > m) {
        return false;
    }
    true
}

fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

fn round4(n: f64) -> f64 {
    (n * 10_000.0).round() / 10_000.0
}

/// Apply the five-step multiplicative chain to a purchase price.
///
/// Returns `None` when the model is disabled or the price is unknown. A zero
/// price still yields an estimate, but without an ROI.
pub fn estimate_profit(price: Option<f64>, model: &ProfitModel) -> Option<ProfitEstimate> {
    if !model.enabled {
        return None;
    }
    let price = price.filter(|p| p.is_finite())?;

    let target = price * (1.0 + model.base_spread_gain + model.sticker_uplift);
    let net_after_steam = target * (1.0 - model.steam_fee);
    let after_discounts = net_after_steam * (1.0 - model.sale_discount);
    let after_hardcut = after_discounts * (1.0 - model.hardcode_cut);

    Some(ProfitEstimate {
        target,
        net_after_steam,
        after_discounts,
        after_hardcut,
        absolute: round2(after_hardcut - price),
        roi: (price != 0.0).then(|| round4((after_hardcut - price) / price)),
    })
}
