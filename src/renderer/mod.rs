//! Rendering-surface abstraction over the browser session.
//!
//! Defines the `SurfaceHost` and `Surface` traits that abstract over the
//! browser engine (currently Chromium via chromiumoxide). The engine only
//! reads from surfaces and issues requests through them; it owns the browser
//! lifecycle only when it launched the browser itself.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

/// A JSON network response captured during passive traffic observation.
#[derive(Debug, Clone)]
pub struct ObservedResponse {
    /// Full URL of the captured response.
    pub url: String,
    /// Parsed response body.
    pub body: Value,
}

/// Result of replaying a request through the surface's own session.
#[derive(Debug, Clone)]
pub struct SessionFetch {
    /// HTTP status, or 0 when the in-page fetch itself failed.
    pub status: u16,
    /// Response body text.
    pub body: String,
}

/// A browser that exposes its open surfaces (tabs).
#[async_trait]
pub trait SurfaceHost: Send + Sync {
    /// Currently open surfaces.
    async fn surfaces(&self) -> Result<Vec<Box<dyn Surface>>>;
    /// True when the browser was attached to rather than launched; attached
    /// browsers are left running on close.
    fn is_attached(&self) -> bool;
    /// Release the host. Closes a self-launched browser exactly once.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A single rendered, navigable content context.
#[async_trait]
pub trait Surface: Send + Sync + std::fmt::Debug {
    /// Current URL.
    async fn url(&self) -> Result<String>;
    /// Focus this surface.
    async fn bring_to_front(&self) -> Result<()>;
    /// Evaluate JavaScript in the page (promises are awaited) and return the
    /// resulting value; `null` for scripts without a result.
    async fn evaluate(&self, expression: &str) -> Result<Value>;
    /// Best-effort wait until `selector` matches at least one element.
    /// Returns false on timeout; a timeout is not an error.
    async fn wait_for_marker(&self, selector: &str, timeout_ms: u64) -> Result<bool>;
    /// Passively observe network responses for `window_ms`, retaining the
    /// *last* one whose URL matches `url_pattern` and whose content type
    /// looks textual/JSON. `None` when nothing matched within the window.
    async fn observe_json_response(
        &self,
        url_pattern: &Regex,
        window_ms: u64,
    ) -> Result<Option<ObservedResponse>>;
    /// Replay a GET through the page's own network session (cookies and
    /// credentials included).
    async fn fetch_json(&self, url: &str, headers: &[(String, String)]) -> Result<SessionFetch>;
    /// Session cookies as name/value pairs.
    async fn cookies(&self) -> Result<Vec<(String, String)>>;
    /// Close this surface.
    async fn close(self: Box<Self>) -> Result<()>;
}
