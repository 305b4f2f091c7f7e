//! Record mapper: one raw upstream record in, one canonical `RawItem` out.
//!
//! The upstream surface is undocumented and multi-shaped, so every field is
//! resolved through an explicit, ordered list of candidate paths — first
//! usable match wins, candidates are never merged. The mapper is total: a
//! malformed record degrades to partial fields or `None`, it never errors.

use crate::model::{RawItem, Sticker};
use serde_json::Value;

/// Name candidates, nested-object variants before flat ones.
const NAME_PATHS: &[&str] = &[
    "asset.name",
    "name",
    "market_hash_name",
    "marketName",
    "title",
    "fullName",
];

/// Fields that are explicitly cents-denominated.
const PRICE_CENTS_PATHS: &[&str] = &["price_cents", "priceCents"];

/// Free-form numeric price fields. Values above the cents threshold are
/// treated as cents, anything else is ambiguous and skipped here.
const PRICE_AMBIGUOUS_PATHS: &[&str] = &["price", "list_price", "sell_price"];

/// String price fields (DOM extractions carry raw price text).
const PRICE_TEXT_PATHS: &[&str] = &["priceText", "price_text", "price"];

/// Sticker container candidates; the first that is an actual array wins.
const STICKER_CONTAINER_PATHS: &[&str] = &[
    "stickers",
    "appliedStickers",
    "applied_stickers",
    "attributes.applied_stickers",
    "asset.stickers",
    "details.stickers",
    "meta.stickers",
];

const STICKER_NAME_PATHS: &[&str] = &["name", "title", "text", "stickerName"];
const STICKER_KIND_PATHS: &[&str] = &["type", "kind"];

/// A numeric value above this is assumed to already be in cents.
const CENTS_THRESHOLD: f64 = 100.0;

/// Maps raw records into `RawItem`s using a fixed price unit factor.
#[derive(Debug, Clone)]
pub struct RecordMapper {
    price_factor: f64,
}

impl RecordMapper {
    pub fn new(price_factor: f64) -> Self {
        Self {
            price_factor: if price_factor > 0.0 { price_factor } else { 100.0 },
        }
    }

    /// Map one raw record. Returns `None` when no usable name is present.
    pub fn map(&self, raw: &Value) -> Option<RawItem> {
        if !raw.is_object() {
            return None;
        }

        let name = NAME_PATHS
            .iter()
            .filter_map(|p| lookup(raw, p))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|s| !s.is_empty())?
            .to_string();

        Some(RawItem {
            name,
            price: self.resolve_price(raw),
            stickers: self.resolve_stickers(raw),
        })
    }

    fn resolve_price(&self, raw: &Value) -> Option<f64> {
        let cents = PRICE_CENTS_PATHS
            .iter()
            .filter_map(|p| lookup(raw, p))
            .find_map(Value::as_f64)
            .or_else(|| {
                PRICE_AMBIGUOUS_PATHS
                    .iter()
                    .filter_map(|p| lookup(raw, p))
                    .filter_map(Value::as_f64)
                    .find(|n| *n > CENTS_THRESHOLD)
            });

        if let Some(cents) = cents {
            return Some(cents / self.price_factor);
        }
        if let Some(n) = lookup(raw, "price").and_then(Value::as_f64) {
            return Some(n);
        }
        PRICE_TEXT_PATHS
            .iter()
            .filter_map(|p| lookup(raw, p))
            .filter_map(Value::as_str)
            .find_map(parse_price)
    }

    fn resolve_stickers(&self, raw: &Value) -> Vec<Sticker> {
        let Some(container) = STICKER_CONTAINER_PATHS
            .iter()
            .filter_map(|p| lookup(raw, p))
            .find_map(Value::as_array)
        else {
            return Vec::new();
        };

        container
            .iter()
            .filter_map(|entry| self.map_sticker(entry))
            .collect()
    }

    fn map_sticker(&self, entry: &Value) -> Option<Sticker> {
        if let Some(s) = entry.as_str() {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            return Some(Sticker::named(s));
        }

        let name = STICKER_NAME_PATHS
            .iter()
            .filter_map(|p| lookup(entry, p))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|s| !s.is_empty())?
            .to_string();

        let kind = STICKER_KIND_PATHS
            .iter()
            .filter_map(|p| lookup(entry, p))
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty());

        let price = lookup(entry, "price").and_then(Value::as_f64).map(|n| {
            if n > CENTS_THRESHOLD {
                n / self.price_factor
            } else {
                n
            }
        });

        Some(Sticker { name, kind, price })
    }
}

/// Resolve a dot-separated path inside a JSON value.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, seg| v.get(seg))
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a free-form price string ("$12.50", "1.234,56", "7").
///
/// The last `.` or `,` is taken as the decimal separator; every other
/// separator is a grouping character. Malformed input yields `None`.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let cleaned = cleaned.trim_end_matches(['.', ',']);
    if cleaned.is_empty() {
        return None;
    }

    let decimal_idx = cleaned.rfind(['.', ',']);
    let normalized = match decimal_idx {
        None => cleaned.to_string(),
        Some(idx) => {
            let int_part: String = cleaned[..idx]
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect();
            format!("{}.{}", int_part, &cleaned[idx + 1..])
        }
    };

    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}
