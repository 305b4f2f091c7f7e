//! Shared test doubles: an in-memory surface host that answers the engine's
//! in-page scripts from canned data.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use sticker_scout::renderer::{ObservedResponse, SessionFetch, Surface, SurfaceHost};

/// A fake rendered surface. Extraction scripts drain `batches`; once only one
/// batch remains it is returned forever (a virtualized list that stopped
/// surfacing new content).
#[derive(Debug)]
pub struct MockSurface {
    url: String,
    marker_count: u64,
    batches: Mutex<VecDeque<Value>>,
    observed: Option<ObservedResponse>,
    pub extract_calls: AtomicUsize,
    pub scroll_calls: AtomicUsize,
}

impl MockSurface {
    pub fn new(url: &str, marker_count: u64, batches: Vec<Value>) -> Self {
        Self {
            url: url.to_string(),
            marker_count,
            batches: Mutex::new(batches.into_iter().collect()),
            observed: None,
            extract_calls: AtomicUsize::new(0),
            scroll_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_observed(mut self, url: &str, body: Value) -> Self {
        self.observed = Some(ObservedResponse {
            url: url.to_string(),
            body,
        });
        self
    }

    /// One DOM record in the shape the extraction script produces.
    pub fn record(name: &str, price_text: &str, stickers: &[&str], sig: &str) -> Value {
        json!({
            "name": name,
            "priceText": price_text,
            "stickers": stickers,
            "sig": sig,
        })
    }

    fn next_batch(&self) -> Value {
        let mut batches = self.batches.lock().unwrap();
        if batches.len() > 1 {
            batches.pop_front().unwrap()
        } else {
            batches.front().cloned().unwrap_or_else(|| json!([]))
        }
    }
}

#[async_trait]
impl Surface for MockSurface {
    async fn url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn bring_to_front(&self) -> Result<()> {
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        if expression.contains("scoutExtractVisible") {
            self.extract_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.next_batch())
        } else if expression.contains("scoutScrollBy") {
            self.scroll_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        } else if expression.contains("scoutLocateScrollRegion") {
            Ok(json!(0))
        } else if expression.contains("scoutMarkerCount") {
            Ok(json!(self.marker_count))
        } else {
            Ok(Value::Null)
        }
    }

    async fn wait_for_marker(&self, _selector: &str, _timeout_ms: u64) -> Result<bool> {
        Ok(self.marker_count > 0)
    }

    async fn observe_json_response(
        &self,
        url_pattern: &Regex,
        _window_ms: u64,
    ) -> Result<Option<ObservedResponse>> {
        Ok(self
            .observed
            .as_ref()
            .filter(|o| url_pattern.is_match(&o.url))
            .cloned())
    }

    async fn fetch_json(&self, _url: &str, _headers: &[(String, String)]) -> Result<SessionFetch> {
        Ok(SessionFetch {
            status: 0,
            body: String::new(),
        })
    }

    async fn cookies(&self) -> Result<Vec<(String, String)>> {
        Ok(Vec::new())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// A host over a fixed set of mock surfaces.
pub struct MockHost {
    surfaces: Mutex<Vec<Box<dyn Surface>>>,
}

impl MockHost {
    pub fn new(surfaces: Vec<Box<dyn Surface>>) -> Self {
        Self {
            surfaces: Mutex::new(surfaces),
        }
    }
}

#[async_trait]
impl SurfaceHost for MockHost {
    async fn surfaces(&self) -> Result<Vec<Box<dyn Surface>>> {
        Ok(std::mem::take(&mut *self.surfaces.lock().unwrap()))
    }

    fn is_attached(&self) -> bool {
        true
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
