//! Canonical item shapes shared by both acquisition strategies.
//!
//! Raw upstream records (DOM extractions or API page entries) are mapped into
//! `RawItem` by the record mapper; items that survive filtering become
//! `ScannedHit`s, the unit the report writer persists.

use serde::{Deserialize, Serialize};

/// A decorative sticker attached to an item.
///
/// Name-only contexts (DOM alt texts, bare strings in API payloads) leave
/// `kind` and `price` unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sticker {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl Sticker {
    /// A sticker known only by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            price: None,
        }
    }
}

/// One canonical item as produced by the record mapper.
///
/// `name` is guaranteed non-empty; records without a usable name never leave
/// the mapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub name: String,
    pub price: Option<f64>,
    pub stickers: Vec<Sticker>,
}

impl RawItem {
    /// Sticker names, in listing order.
    pub fn sticker_names(&self) -> Vec<&str> {
        self.stickers.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Deterministic profit estimate for a purchase price under a profit model.
///
/// `roi` is absent when the purchase price is zero (the ratio is undefined).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitEstimate {
    pub target: f64,
    pub net_after_steam: f64,
    pub after_discounts: f64,
    pub after_hardcut: f64,
    pub absolute: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi: Option<f64>,
}

/// An item that passed the filter stage, ready for the report writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedHit {
    pub name: String,
    pub price: Option<f64>,
    pub stickers: Vec<Sticker>,
    pub profit: Option<ProfitEstimate>,
}

impl ScannedHit {
    /// Sticker names joined for tabular output.
    pub fn sticker_column(&self) -> String {
        self.stickers
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}
