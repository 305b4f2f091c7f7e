//! Passive endpoint discovery.
//!
//! Rather than hardcoding the marketplace's (undocumented) inventory API,
//! the strategy watches the traffic the rendered page already generates and
//! keeps the last response that matches the configured URL pattern. A fixed
//! `endpoint` in the config skips observation entirely.

use crate::acquisition::api::normalize_base_url;
use crate::config::ApiConfig;
use crate::renderer::Surface;
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

/// A usable paginated data source behind the rendered surface.
#[derive(Debug, Clone)]
pub struct DiscoveredEndpoint {
    /// Endpoint URL; page/size parameters are overwritten per request.
    pub url: String,
    /// Sample payload captured during observation, when available.
    pub sample: Option<Value>,
}

/// Discover the endpoint backing `surface`, or `None` when nothing matching
/// was observed within the discovery window. `fallback_host` completes a
/// configured endpoint given as a bare path.
pub async fn discover_endpoint(
    surface: &dyn Surface,
    cfg: &ApiConfig,
    fallback_host: &str,
) -> Result<Option<DiscoveredEndpoint>> {
    if let Some(endpoint) = &cfg.endpoint {
        match normalize_base_url(endpoint, fallback_host) {
            Some(url) => {
                info!("using configured endpoint {url}, skipping discovery");
                return Ok(Some(DiscoveredEndpoint { url, sample: None }));
            }
            None => warn!("configured endpoint is blank, falling back to discovery"),
        }
    }

    let pattern = Regex::new(&cfg.discovery_pattern)
        .with_context(|| format!("invalid discovery pattern {:?}", cfg.discovery_pattern))?;

    debug!(
        "observing network traffic for {}ms (pattern {:?})",
        cfg.discovery_window_ms, cfg.discovery_pattern
    );
    let observed = surface
        .observe_json_response(&pattern, cfg.discovery_window_ms)
        .await?;

    Ok(observed.map(|o| {
        info!("discovered endpoint {}", o.url);
        DiscoveredEndpoint {
            url: o.url,
            sample: Some(o.body),
        }
    }))
}
