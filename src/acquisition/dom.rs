//! DOM acquisition strategy: drive the rendered trade page.
//!
//! The item grid is virtualized, so records are harvested incrementally:
//! extract what is visible, advance the scroll position by a fixed delta,
//! wait for the list to settle, extract again. The loop ends after a
//! configured number of batches, or earlier once several consecutive
//! advances stop surfacing new content.

use crate::config::{ScrollConfig, Selectors, TargetConfig};
use crate::error::ScanError;
use crate::renderer::Surface;
use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One record extracted from the rendered grid. The signature doubles as the
/// record's identity key downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct DomRecord {
    pub name: String,
    #[serde(rename = "priceText")]
    pub price_text: String,
    pub stickers: Vec<String>,
    pub sig: String,
}

impl DomRecord {
    /// Raw-record shape for the canonical mapper.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "priceText": self.price_text,
            "stickers": self.stickers,
        })
    }
}

fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Score candidate surfaces by URL hint, known URL shape, and visible item
/// markers; pick the highest. Fails when nothing scores above zero.
pub async fn select_surface(
    surfaces: Vec<Box<dyn Surface>>,
    target: &TargetConfig,
    selectors: &Selectors,
) -> Result<Box<dyn Surface>> {
    let pattern = Regex::new(&target.url_pattern).ok();
    let count_script = format!(
        "/* scoutMarkerCount */ document.querySelectorAll({}).length",
        js_str(&selectors.card)
    );

    let mut best: Option<(i32, Box<dyn Surface>)> = None;
    for surface in surfaces {
        let url = surface.url().await.unwrap_or_default();
        let mut score = 0;
        if !target.url_hint.is_empty() && url.contains(&target.url_hint) {
            score += 5;
        }
        if pattern.as_ref().is_some_and(|rx| rx.is_match(&url)) {
            score += 3;
        }
        let markers = surface
            .evaluate(&count_script)
            .await
            .ok()
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if markers > 8 {
            score += 4;
        } else if markers > 0 {
            score += 2;
        }
        debug!("surface candidate {url:?} scored {score}");

        if best.as_ref().is_none_or(|(s, _)| score > *s) {
            best = Some((score, surface));
        }
    }

    match best {
        Some((score, surface)) if score > 0 => {
            let _ = surface.bring_to_front().await;
            Ok(surface)
        }
        _ => Err(ScanError::NoSurface.into()),
    }
}

/// Harvests records from one surface through scroll advances.
pub struct DomStrategy<'a> {
    selectors: &'a Selectors,
    scroll: &'a ScrollConfig,
}

impl<'a> DomStrategy<'a> {
    pub fn new(selectors: &'a Selectors, scroll: &'a ScrollConfig) -> Self {
        Self { selectors, scroll }
    }

    /// Extract the first screen, then scroll-and-stream until the content
    /// stops growing. Returns the number of batches handed to `on_batch`.
    pub async fn run(
        &self,
        surface: &dyn Surface,
        mut on_batch: impl FnMut(Vec<DomRecord>),
    ) -> Result<u32> {
        let appeared = surface
            .wait_for_marker(&self.selectors.card, self.scroll.marker_wait_ms)
            .await
            .unwrap_or(false);
        if !appeared {
            // Best-effort wait: proceed with whatever is present.
            warn!(
                "no item markers after {}ms, extracting what is present",
                self.scroll.marker_wait_ms
            );
        }

        let mut batches = 1;
        on_batch(self.extract_visible(surface).await?);

        let region = self.locate_scroll_region(surface).await?;
        match region {
            Some(idx) => debug!("scroll region: container candidate #{idx}"),
            None => debug!("scroll region: root scrolling element"),
        }

        let mut last_seen = 0usize;
        let mut no_new = 0u32;
        for _ in 0..self.scroll.max_batches {
            surface
                .evaluate(&self.scroll_script(region))
                .await?;
            tokio::time::sleep(Duration::from_millis(self.scroll.wait_between_ms)).await;

            let batch = self.extract_visible(surface).await?;
            let count = batch.len();
            on_batch(batch);
            batches += 1;

            if count <= last_seen {
                no_new += 1;
            } else {
                no_new = 0;
                last_seen = count;
            }
            if no_new >= self.scroll.early_stop_if_no_new {
                info!("no new content after {no_new} advances, stopping early");
                break;
            }
        }

        Ok(batches)
    }

    /// Read every currently-rendered item marker.
    pub async fn extract_visible(&self, surface: &dyn Surface) -> Result<Vec<DomRecord>> {
        let value = surface.evaluate(&self.extract_script()).await?;
        match serde_json::from_value(value) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("visible extraction returned an unexpected shape: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Index of the first container candidate whose computed overflow allows
    /// scrolling; `None` means the root scrolling element.
    async fn locate_scroll_region(&self, surface: &dyn Surface) -> Result<Option<usize>> {
        let script = format!(
            r#"(() => {{ /* scoutLocateScrollRegion */
  const cands = Array.from(document.querySelectorAll({container}));
  for (let i = 0; i < cands.length; i++) {{
    const style = getComputedStyle(cands[i]);
    if (/(auto|scroll)/.test(style.overflowY)) return i;
  }}
  return -1;
}})()"#,
            container = js_str(&self.selectors.scroll_container)
        );
        let idx = surface
            .evaluate(&script)
            .await?
            .as_i64()
            .unwrap_or(-1);
        Ok((idx >= 0).then_some(idx as usize))
    }

    fn extract_script(&self) -> String {
        format!(
            r#"(() => {{ /* scoutExtractVisible */
  const cards = Array.from(document.querySelectorAll({card}));
  return cards.map((card) => {{
    const img = card.querySelector({image});
    const nameEl = card.querySelector({name});
    const priceEl = card.querySelector({price});
    const stickerImgs = Array.from(card.querySelectorAll({stickers}));
    const name =
      (img && (img.getAttribute('alt') || '').trim()) ||
      (nameEl && (nameEl.textContent || '').trim()) ||
      '';
    const priceText = priceEl && priceEl.textContent ? priceEl.textContent.trim() : '';
    const names = stickerImgs.map((im) => (im.getAttribute('alt') || '').trim()).filter(Boolean);
    return {{
      name,
      priceText,
      stickers: names,
      sig: name + '::' + priceText + '::' + names.join('|'),
    }};
  }});
}})()"#,
            card = js_str(&self.selectors.card),
            image = js_str(&self.selectors.item_image),
            name = js_str(&self.selectors.name),
            price = js_str(&self.selectors.price),
            stickers = js_str(&self.selectors.sticker_images),
        )
    }

    fn scroll_script(&self, region: Option<usize>) -> String {
        let idx = region.map(|i| i as i64).unwrap_or(-1);
        format!(
            r#"(() => {{ /* scoutScrollBy */
  const cands = document.querySelectorAll({container});
  const el = {idx} >= 0 && cands[{idx}] ? cands[{idx}] : (document.scrollingElement || document.body);
  if (el.scrollBy) el.scrollBy(0, {dy}); else el.scrollTop = (el.scrollTop || 0) + {dy};
  return null;
}})()"#,
            container = js_str(&self.selectors.scroll_container),
            idx = idx,
            dy = self.scroll.per_batch_px,
        )
    }
}
