//! API acquisition strategy: page through a JSON inventory endpoint.
//!
//! Every request goes through the pacing governor first. Failures follow a
//! fixed policy: halt-listed statuses stop the run outright, rate-limit and
//! transport failures get exactly one backoff-then-retry, everything else
//! burns the consecutive-error budget.

use crate::acquisition::discovery::DiscoveredEndpoint;
use crate::acquisition::http_client::{FetchResponse, HttpClient};
use crate::config::{ApiConfig, PolitenessConfig};
use crate::error::body_sample;
use crate::mapper::lookup;
use crate::pacing::{ErrorBudget, PacingGovernor};
use crate::renderer::Surface;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Request timeout for page fetches.
const PAGE_TIMEOUT_MS: u64 = 20_000;

/// Statuses worth replaying through the surface's own session.
fn is_blocked_class(status: u16) -> bool {
    matches!(status, 401 | 403 | 429)
}

/// Generic container paths inside a page response, tried after the
/// source-specific `assets` container and a bare top-level array.
const CONTAINER_PATHS: &[&str] = &["items", "data", "data.items", "results", "inventory"];

/// Paths under which one container entry wraps several sub-items
/// (individually priced variants).
const NESTED_PATHS: &[&str] = &["items", "assets", "variants"];

/// Why pagination ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// All budgeted pages were fetched.
    Exhausted,
    /// A page yielded zero records.
    EmptyPage,
    /// A page yielded fewer records than a full page.
    ShortPage,
    /// A halt-listed HTTP status was seen.
    Halted { status: u16 },
    /// Too many consecutive failures.
    ErrorBudget { count: u32 },
    /// Dry run: URLs were logged, nothing was fetched.
    DryRun,
}

impl StopReason {
    /// True for the stop conditions the orchestrator reports as failures.
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::Halted { .. } | StopReason::ErrorBudget { .. })
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Exhausted => write!(f, "page budget exhausted"),
            StopReason::EmptyPage => write!(f, "empty page"),
            StopReason::ShortPage => write!(f, "short page (end of inventory)"),
            StopReason::Halted { status } => write!(f, "halted by HTTP {status}"),
            StopReason::ErrorBudget { count } => {
                write!(f, "gave up after {count} consecutive failures")
            }
            StopReason::DryRun => write!(f, "dry run"),
        }
    }
}

/// Pagination statistics for the run summary.
#[derive(Debug, Clone)]
pub struct PageStats {
    pub pages: u32,
    pub records: u64,
    pub stop: StopReason,
}

/// A page fetch failure, classified for the retry policy.
#[derive(Debug)]
enum PageFetchError {
    Status { status: u16, body: String },
    Transport(String),
}

impl PageFetchError {
    /// Rate-limit and transport failures get one backoff-then-retry.
    fn is_transient(&self) -> bool {
        match self {
            PageFetchError::Status { status, .. } => *status == 429,
            PageFetchError::Transport(_) => true,
        }
    }
}

impl fmt::Display for PageFetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageFetchError::Status { status, body } => {
                write!(f, "HTTP {status}: {}", body_sample(body))
            }
            PageFetchError::Transport(msg) => write!(f, "transport: {msg}"),
        }
    }
}

/// Drives a paginated JSON endpoint to completion.
pub struct ApiStrategy<'a> {
    cfg: &'a ApiConfig,
    politeness: &'a PolitenessConfig,
    client: HttpClient,
}

impl<'a> ApiStrategy<'a> {
    pub fn new(cfg: &'a ApiConfig, politeness: &'a PolitenessConfig) -> Self {
        Self {
            cfg,
            politeness,
            client: HttpClient::new(PAGE_TIMEOUT_MS),
        }
    }

    /// Page through the endpoint, handing every record (with an optional
    /// page-qualified identity key) to `on_record`.
    pub async fn run(
        &self,
        endpoint: &DiscoveredEndpoint,
        surface: Option<&dyn Surface>,
        governor: &mut PacingGovernor,
        price_bounds: (Option<f64>, Option<f64>),
        mut on_record: impl FnMut(&Value, Option<&str>),
    ) -> Result<PageStats> {
        let max_pages = self.cfg.max_pages.min(self.politeness.max_pages_per_run);
        let mut budget = ErrorBudget::new(self.politeness.max_consecutive_errors);
        let mut stats = PageStats {
            pages: 0,
            records: 0,
            stop: StopReason::Exhausted,
        };

        let headers = self.request_headers(&endpoint.url, surface).await;

        for page in 0..max_pages {
            let offset = self.cfg.start_offset + page as u64 * self.cfg.page_size as u64;
            let url = build_page_url(&endpoint.url, self.cfg, offset, price_bounds)?;

            if self.politeness.dry_run {
                info!("dry run URL: {url}");
                continue;
            }

            governor.wait().await;

            let json = match self.fetch_page(&url, &headers, surface).await {
                Ok(json) => {
                    budget.success();
                    json
                }
                Err(err) => {
                    warn!("page fetch failed: {err}");

                    if let Some(status) = self.halted_status(&err) {
                        stats.stop = StopReason::Halted { status };
                        return Ok(stats);
                    }

                    if err.is_transient() {
                        tokio::time::sleep(Duration::from_millis(self.politeness.backoff_ms))
                            .await;
                        match self.fetch_page(&url, &headers, surface).await {
                            Ok(json) => {
                                budget.success();
                                json
                            }
                            Err(retry_err) => {
                                warn!("retry failed: {retry_err}");
                                if let Some(status) = self.halted_status(&retry_err) {
                                    stats.stop = StopReason::Halted { status };
                                    return Ok(stats);
                                }
                                if budget.failure() {
                                    stats.stop = StopReason::ErrorBudget {
                                        count: budget.count(),
                                    };
                                    return Ok(stats);
                                }
                                continue;
                            }
                        }
                    } else {
                        if budget.failure() {
                            stats.stop = StopReason::ErrorBudget {
                                count: budget.count(),
                            };
                            return Ok(stats);
                        }
                        continue;
                    }
                }
            };

            let items = extract_items(&json);
            info!(
                "page {}: got {} items (offset={offset})",
                page + 1,
                items.len()
            );
            stats.pages += 1;

            if items.is_empty() {
                stats.stop = StopReason::EmptyPage;
                return Ok(stats);
            }

            for (idx, entry) in items.iter().enumerate() {
                match nested_entries(entry) {
                    Some(subs) => {
                        for (sub_idx, sub) in subs.iter().enumerate() {
                            let key = format!("{offset}:{idx}:{sub_idx}");
                            on_record(sub, Some(key.as_str()));
                            stats.records += 1;
                        }
                    }
                    None => {
                        on_record(entry, None);
                        stats.records += 1;
                    }
                }
            }

            if items.len() < self.cfg.page_size as usize {
                stats.stop = StopReason::ShortPage;
                return Ok(stats);
            }
        }

        if self.politeness.dry_run {
            stats.stop = StopReason::DryRun;
        }
        Ok(stats)
    }

    fn halted_status(&self, err: &PageFetchError) -> Option<u16> {
        match err {
            PageFetchError::Status { status, .. }
                if self.politeness.stop_on_http.contains(status) =>
            {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Fetch one page directly; replay once through the surface's session on
    /// an auth/block/rate-limit status when configured.
    async fn fetch_page(
        &self,
        url: &str,
        headers: &[(String, String)],
        surface: Option<&dyn Surface>,
    ) -> std::result::Result<Value, PageFetchError> {
        debug!("GET {url}");
        let resp = self
            .client
            .get(url, headers)
            .await
            .map_err(|e| PageFetchError::Transport(e.to_string()))?;

        if is_success(&resp) {
            return parse_page(&resp.body);
        }

        if is_blocked_class(resp.status) && self.cfg.session_fallback {
            if let Some(surface) = surface {
                debug!("HTTP {}, replaying through the page session", resp.status);
                let replay = surface
                    .fetch_json(url, headers)
                    .await
                    .map_err(|e| PageFetchError::Transport(e.to_string()))?;
                if (200..300).contains(&replay.status) {
                    return parse_page(&replay.body);
                }
                return Err(PageFetchError::Status {
                    status: if replay.status > 0 {
                        replay.status
                    } else {
                        resp.status
                    },
                    body: replay.body,
                });
            }
        }

        Err(PageFetchError::Status {
            status: resp.status,
            body: resp.body,
        })
    }

    /// Fixed outbound headers: polite defaults derived from the endpoint,
    /// configured extras on top, optionally the surface's own cookies.
    async fn request_headers(
        &self,
        endpoint_url: &str,
        surface: Option<&dyn Surface>,
    ) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = vec![(
            "Accept".into(),
            "application/json, text/plain, */*".into(),
        )];

        if let Ok(parsed) = url::Url::parse(endpoint_url) {
            if let Some(host) = parsed.host_str() {
                let origin = format!("{}://{host}", parsed.scheme());
                headers.push(("Referer".into(), format!("{origin}/")));
                headers.push(("Origin".into(), origin));
            }
        }
        headers.push(("Accept-Language".into(), "en-US,en;q=0.9".into()));

        for (name, value) in &self.cfg.headers {
            headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }

        if self.cfg.use_session_cookies {
            if let Some(surface) = surface {
                match surface.cookies().await {
                    Ok(cookies) if !cookies.is_empty() => {
                        let jar = cookies
                            .iter()
                            .map(|(n, v)| format!("{n}={v}"))
                            .collect::<Vec<_>>()
                            .join("; ");
                        headers.push(("Cookie".into(), jar));
                    }
                    Ok(_) => {}
                    Err(e) => warn!("could not read session cookies: {e}"),
                }
            }
        }

        headers
    }
}

fn is_success(resp: &FetchResponse) -> bool {
    (200..300).contains(&resp.status)
}

fn parse_page(body: &str) -> std::result::Result<Value, PageFetchError> {
    serde_json::from_str(body)
        .map_err(|e| PageFetchError::Transport(format!("invalid JSON page: {e}")))
}

/// Normalize a base URL that may arrive scheme-less or path-only.
pub fn normalize_base_url(raw: &str, fallback_host: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if t.starts_with("http://") || t.starts_with("https://") {
        return Some(t.to_string());
    }
    if let Some(rest) = t.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if t.starts_with('/') {
        return Some(format!("https://{fallback_host}{t}"));
    }
    Some(format!("https://{t}"))
}

/// Deterministically construct the next page's URL: page/size parameters are
/// overwritten, configured extras attached, and price bounds translated into
/// the endpoint's native unit when server-side filtering is on.
pub fn build_page_url(
    base: &str,
    cfg: &ApiConfig,
    offset: u64,
    price_bounds: (Option<f64>, Option<f64>),
) -> Result<String> {
    let mut url =
        url::Url::parse(base).with_context(|| format!("invalid endpoint URL {base:?}"))?;

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| {
            k != &cfg.limit_param
                && k != &cfg.offset_param
                && k != &cfg.price_min_param
                && k != &cfg.price_max_param
                && !cfg.extra_params.contains_key(k)
        })
        .collect();

    for (k, v) in &cfg.extra_params {
        params.push((k.clone(), v.clone()));
    }
    params.push((cfg.limit_param.clone(), cfg.page_size.to_string()));
    params.push((cfg.offset_param.clone(), offset.to_string()));

    if cfg.server_price_filter {
        if let Some(min) = price_bounds.0 {
            params.push((cfg.price_min_param.clone(), to_native_units(min, cfg)));
        }
        if let Some(max) = price_bounds.1 {
            params.push((cfg.price_max_param.clone(), to_native_units(max, cfg)));
        }
    }

    url.set_query(None);
    url.query_pairs_mut().extend_pairs(params);
    Ok(url.to_string())
}

fn to_native_units(price: f64, cfg: &ApiConfig) -> String {
    ((price * cfg.price_factor).round() as i64).to_string()
}

/// Extract the record array from a heterogeneous page response. The
/// source-specific `assets` container is checked first, then a bare
/// top-level array, then the generic container paths. First non-empty
/// match wins.
pub fn extract_items(json: &Value) -> Vec<Value> {
    if let Some(arr) = json.get("assets").and_then(Value::as_array) {
        if !arr.is_empty() {
            return arr.clone();
        }
    }
    if let Some(arr) = json.as_array() {
        if !arr.is_empty() {
            return arr.clone();
        }
    }
    for path in CONTAINER_PATHS {
        if let Some(arr) = lookup(json, path).and_then(Value::as_array) {
            if !arr.is_empty() {
                return arr.clone();
            }
        }
    }
    Vec::new()
}

/// Sub-items nested inside one container entry, when present.
fn nested_entries(entry: &Value) -> Option<&Vec<Value>> {
    NESTED_PATHS
        .iter()
        .filter_map(|p| entry.get(*p))
        .find_map(Value::as_array)
        .filter(|arr| !arr.is_empty())
}
