//! Dedup stream sink: membership-tested accumulation of accepted hits.
//!
//! Identity keys live only for the run; nothing here is persisted. Ordering
//! is discovery order until `finish` applies the configured terminal sort.

use crate::config::SortBy;
use crate::model::ScannedHit;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Dedup behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupMode {
    /// Reject repeats of an identity key (default).
    #[default]
    Strict,
    /// Accept every record; used when strategy-level keys already guarantee
    /// uniqueness (page-qualified keys).
    Permissive,
}

/// Stable identity key from an item's defining fields.
pub fn identity_key(name: &str, price: Option<f64>, sticker_names: &[&str]) -> String {
    let price = price.map(|p| p.to_string()).unwrap_or_default();
    format!("{}::{}::{}", name, price, sticker_names.join("|"))
}

/// Stateful accumulator for the scan pipeline.
#[derive(Debug)]
pub struct DedupSink {
    mode: DedupMode,
    seen: HashSet<String>,
    hits: Vec<ScannedHit>,
}

impl DedupSink {
    pub fn new(mode: DedupMode) -> Self {
        Self {
            mode,
            seen: HashSet::new(),
            hits: Vec::new(),
        }
    }

    /// Offer a hit under its derived identity key. Returns true if newly
    /// accepted.
    pub fn offer(&mut self, hit: ScannedHit) -> bool {
        let names: Vec<&str> = hit.stickers.iter().map(|s| s.name.as_str()).collect();
        let key = identity_key(&hit.name, hit.price, &names);
        self.offer_keyed(&key, hit)
    }

    /// Offer a hit under a caller-supplied key.
    pub fn offer_keyed(&mut self, key: &str, hit: ScannedHit) -> bool {
        if self.mode == DedupMode::Strict && !self.seen.insert(key.to_string()) {
            return false;
        }
        self.hits.push(hit);
        true
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Consume the sink and return the hits in the configured terminal order.
    /// Items missing the sort key sort last.
    pub fn finish(self, sort_by: SortBy) -> Vec<ScannedHit> {
        let mut hits = self.hits;
        match sort_by {
            SortBy::Roi => hits.sort_by(|a, b| roi_of(b).total_cmp(&roi_of(a))),
            SortBy::Price => hits.sort_by(|a, b| {
                a.price
                    .unwrap_or(f64::INFINITY)
                    .total_cmp(&b.price.unwrap_or(f64::INFINITY))
            }),
            SortBy::None => {}
        }
        hits
    }
}

fn roi_of(hit: &ScannedHit) -> f64 {
    hit.profit
        .as_ref()
        .and_then(|p| p.roi)
        .unwrap_or(f64::NEG_INFINITY)
}
