//! Engine orchestrator: strategy selection, pipeline wiring, and browser
//! lifecycle.
//!
//! Preference order: discover a paginated endpoint behind the open surface
//! and page through it; fall back to driving the rendered DOM when nothing
//! is discovered. Every record either strategy yields flows through
//! mapper → filter → sink in arrival order. Fatal acquisition conditions
//! (halt-listed status, exhausted error budget) end the run early but the
//! accumulated hits are kept; only "no usable surface" aborts outright.

use crate::acquisition::api::{ApiStrategy, StopReason};
use crate::acquisition::discovery::{self, DiscoveredEndpoint};
use crate::acquisition::dom::{self, DomStrategy};
use crate::config::ScoutConfig;
use crate::error::ScanError;
use crate::filter::{estimate_profit, ItemFilter};
use crate::mapper::{normalize_spaces, RecordMapper};
use crate::model::ScannedHit;
use crate::pacing::PacingGovernor;
use crate::renderer::chromium::ChromiumHost;
use crate::renderer::{Surface, SurfaceHost};
use crate::sink::DedupSink;
use anyhow::Result;
use serde_json::Value;
use std::fmt;
use tracing::{info, warn};

/// Which strategy produced the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Api,
    Dom,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Api => write!(f, "api"),
            StrategyKind::Dom => write!(f, "dom"),
        }
    }
}

/// Result of one scan run.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Retained hits in the configured terminal order.
    pub hits: Vec<ScannedHit>,
    pub strategy: StrategyKind,
    /// Pages fetched (API) or batches extracted (DOM).
    pub pages: u32,
    /// Raw records that entered the pipeline.
    pub records_seen: u64,
    /// API stop reason, when the API strategy ran.
    pub stop: Option<StopReason>,
}

/// Mapper → filter → sink, shared by both strategies.
struct Pipeline {
    mapper: RecordMapper,
    filter: ItemFilter,
    sink: DedupSink,
    config: ScoutConfig,
    records_seen: u64,
}

impl Pipeline {
    fn new(config: &ScoutConfig) -> Self {
        Self {
            mapper: RecordMapper::new(config.api.price_factor),
            filter: ItemFilter::new(&config.filters),
            sink: DedupSink::new(config.dedup_mode),
            config: config.clone(),
            records_seen: 0,
        }
    }

    /// Push one raw record through the pipeline. Malformed and non-matching
    /// records are dropped silently.
    fn ingest(&mut self, raw: &Value, key: Option<&str>) {
        self.records_seen += 1;
        let Some(item) = self.mapper.map(raw) else {
            return;
        };
        if !self.filter.matches(&item) {
            return;
        }

        let hit = ScannedHit {
            name: normalize_spaces(&item.name),
            price: item.price,
            profit: estimate_profit(item.price, &self.config.profit),
            stickers: item.stickers,
        };

        let streamed = self.config.output.stream_hits.then(|| hit.clone());
        let accepted = match key {
            Some(key) => self.sink.offer_keyed(key, hit),
            None => self.sink.offer(hit),
        };
        if accepted {
            if let Some(hit) = streamed {
                println!("{}", serde_json::json!({ "type": "HIT", "data": hit }));
            }
        }
    }
}

/// Runs the acquisition engine against a browser session.
pub struct Scanner {
    config: ScoutConfig,
}

impl Scanner {
    pub fn new(config: ScoutConfig) -> Self {
        Self { config }
    }

    /// Acquire a browser, run the scan, and release the browser on every
    /// exit path.
    pub async fn run(&self) -> Result<ScanOutcome> {
        let host: Box<dyn SurfaceHost> = match &self.config.browser.connect_ws_endpoint {
            Some(ws) => {
                info!("attaching to browser at {ws}");
                Box::new(ChromiumHost::connect(ws).await?)
            }
            None => {
                info!("launching headless browser");
                Box::new(ChromiumHost::launch(&self.config.browser).await?)
            }
        };

        let result = self.run_with_host(host.as_ref()).await;

        if let Err(e) = host.close().await {
            warn!("failed to release browser: {e}");
        }
        result
    }

    /// Run the scan against an already-acquired host. Exposed for tests.
    pub async fn run_with_host(&self, host: &dyn SurfaceHost) -> Result<ScanOutcome> {
        let mut surfaces = host.surfaces().await?;
        if surfaces.is_empty() {
            return Err(ScanError::NoSurface.into());
        }

        let mut pipeline = Pipeline::new(&self.config);

        let discovered = if self.config.api.enabled {
            let idx = discovery_surface_index(&surfaces, &self.config.target.url_hint).await;
            let fallback_host = self
                .config
                .target
                .url_hint
                .split('/')
                .next()
                .unwrap_or_default();
            discovery::discover_endpoint(surfaces[idx].as_ref(), &self.config.api, fallback_host)
                .await?
                .map(|ep| (idx, ep))
        } else {
            None
        };

        let (strategy, pages, stop) = match discovered {
            Some((idx, endpoint)) => {
                let surface = surfaces.swap_remove(idx);
                let (pages, stop) = self
                    .run_api(&endpoint, Some(surface.as_ref()), &mut pipeline)
                    .await?;
                (StrategyKind::Api, pages, Some(stop))
            }
            None => {
                if self.config.api.enabled {
                    info!("no endpoint discovered, falling back to DOM extraction");
                }
                let batches = self.run_dom(surfaces, &mut pipeline).await?;
                (StrategyKind::Dom, batches, None)
            }
        };

        let records_seen = pipeline.records_seen;
        let hits = pipeline.sink.finish(self.config.output.sort_by);
        info!(
            "scan complete: {} hits from {records_seen} records ({strategy}, {pages} pages)",
            hits.len()
        );

        Ok(ScanOutcome {
            hits,
            strategy,
            pages,
            records_seen,
            stop,
        })
    }

    async fn run_api(
        &self,
        endpoint: &DiscoveredEndpoint,
        surface: Option<&dyn Surface>,
        pipeline: &mut Pipeline,
    ) -> Result<(u32, StopReason)> {
        info!("using API strategy via {}", endpoint.url);
        let strategy = ApiStrategy::new(&self.config.api, &self.config.politeness);
        let mut governor = PacingGovernor::new(&self.config.politeness);
        let bounds = (self.config.filters.min_price, self.config.filters.max_price);

        let stats = strategy
            .run(endpoint, surface, &mut governor, bounds, |raw, key| {
                pipeline.ingest(raw, key)
            })
            .await?;

        if stats.stop.is_failure() {
            warn!("acquisition ended early: {}", stats.stop);
        }
        Ok((stats.pages, stats.stop))
    }

    async fn run_dom(
        &self,
        surfaces: Vec<Box<dyn Surface>>,
        pipeline: &mut Pipeline,
    ) -> Result<u32> {
        let surface =
            dom::select_surface(surfaces, &self.config.target, &self.config.selectors).await?;
        info!(
            "using DOM strategy on {}",
            surface.url().await.unwrap_or_default()
        );

        let strategy = DomStrategy::new(&self.config.selectors, &self.config.scroll);
        let batches = strategy
            .run(surface.as_ref(), |batch| {
                for record in batch {
                    pipeline.ingest(&record.to_value(), Some(record.sig.as_str()));
                }
            })
            .await?;
        Ok(batches)
    }
}

/// Prefer a surface whose URL matches the target hint for traffic
/// observation; any open surface works otherwise.
async fn discovery_surface_index(surfaces: &[Box<dyn Surface>], hint: &str) -> usize {
    if !hint.is_empty() {
        for (idx, surface) in surfaces.iter().enumerate() {
            if surface.url().await.unwrap_or_default().contains(hint) {
                return idx;
            }
        }
    }
    0
}
