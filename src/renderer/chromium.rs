//! Chromium-based surface host using chromiumoxide.

use super::{ObservedResponse, SessionFetch, Surface, SurfaceHost};
use crate::config::BrowserConfig as ScoutBrowserConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Poll interval for the best-effort marker wait.
const MARKER_POLL: Duration = Duration::from_millis(250);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. SCOUT_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("SCOUT_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.scout/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".scout/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".scout/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".scout/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".scout/chromium/chrome-linux64/chrome"),
                home.join(".scout/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-backed surface host: either a self-launched headless instance or
/// an attachment to an already-running browser over CDP.
pub struct ChromiumHost {
    browser: Browser,
    attached: bool,
}

impl ChromiumHost {
    /// Launch a headless Chromium instance owned by this run.
    pub async fn launch(cfg: &ScoutBrowserConfig) -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Install Chrome/Chromium or set SCOUT_CHROMIUM_PATH.")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(cfg.viewport_width, cfg.viewport_height)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        if cfg.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        for arg in &cfg.args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Drive the CDP event loop for the lifetime of the browser.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            attached: false,
        })
    }

    /// Attach to an externally running browser. The browser stays open after
    /// the run.
    pub async fn connect(ws_endpoint: &str) -> Result<Self> {
        let (browser, mut handler) = Browser::connect(ws_endpoint)
            .await
            .with_context(|| format!("failed to attach to browser at {ws_endpoint}"))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            attached: true,
        })
    }
}

#[async_trait]
impl SurfaceHost for ChromiumHost {
    async fn surfaces(&self) -> Result<Vec<Box<dyn Surface>>> {
        let pages = self
            .browser
            .pages()
            .await
            .context("failed to list browser pages")?;

        Ok(pages
            .into_iter()
            .map(|page| Box::new(ChromiumSurface { page }) as Box<dyn Surface>)
            .collect())
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if self.attached {
            debug!("leaving attached browser running");
            return Ok(());
        }
        let mut browser = self.browser;
        if let Err(e) = browser.close().await {
            warn!("browser close failed: {e}");
        }
        let _ = browser.wait().await;
        Ok(())
    }
}

/// A single Chromium page.
pub struct ChromiumSurface {
    page: Page,
}

impl std::fmt::Debug for ChromiumSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumSurface").finish_non_exhaustive()
    }
}

#[async_trait]
impl Surface for ChromiumSurface {
    async fn url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn bring_to_front(&self) -> Result<()> {
        self.page
            .bring_to_front()
            .await
            .context("failed to focus surface")?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| anyhow!("failed to build evaluate params: {e}"))?;

        let result = self
            .page
            .evaluate(params)
            .await
            .context("JS evaluation failed")?;

        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn wait_for_marker(&self, selector: &str, timeout_ms: u64) -> Result<bool> {
        let script = format!(
            "document.querySelectorAll({}).length",
            serde_json::Value::String(selector.to_string())
        );
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            let count = self
                .evaluate(&script)
                .await
                .ok()
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            if count > 0 {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(MARKER_POLL).await;
        }
    }

    async fn observe_json_response(
        &self,
        url_pattern: &Regex,
        window_ms: u64,
    ) -> Result<Option<ObservedResponse>> {
        let mut events = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to subscribe to network responses")?;

        let mut last: Option<(String, chromiumoxide::cdp::browser_protocol::network::RequestId)> =
            None;

        // Collect for the whole window; the last match is the representative
        // one (later responses reflect the page's current query state).
        let _ = tokio::time::timeout(Duration::from_millis(window_ms), async {
            while let Some(event) = events.next().await {
                let url = event.response.url.clone();
                let mime = event.response.mime_type.to_lowercase();
                let textual = mime.contains("json") || mime.starts_with("text/");
                if textual && url_pattern.is_match(&url) {
                    debug!("observed candidate response: {url}");
                    last = Some((url, event.request_id.clone()));
                }
            }
        })
        .await;

        let Some((url, request_id)) = last else {
            return Ok(None);
        };

        let body = self
            .page
            .execute(GetResponseBodyParams::new(request_id))
            .await
            .context("failed to read observed response body")?;
        let raw = if body.base64_encoded {
            let bytes = BASE64
                .decode(body.body.as_bytes())
                .context("observed body is not valid base64")?;
            String::from_utf8(bytes).context("observed body is not UTF-8")?
        } else {
            body.body.clone()
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(parsed) => Ok(Some(ObservedResponse { url, body: parsed })),
            Err(e) => {
                warn!("observed response at {url} is not JSON: {e}");
                Ok(None)
            }
        }
    }

    async fn fetch_json(&self, url: &str, headers: &[(String, String)]) -> Result<SessionFetch> {
        let header_map: BTreeMap<&str, &str> = headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let script = format!(
            "(async () => {{ try {{ \
                const r = await fetch({url}, {{ headers: {headers}, credentials: 'include' }}); \
                return {{ status: r.status, body: await r.text() }}; \
            }} catch (e) {{ return {{ status: 0, body: String(e) }}; }} }})()",
            url = serde_json::Value::String(url.to_string()),
            headers = serde_json::to_string(&header_map).unwrap_or_else(|_| "{}".into()),
        );

        let value = self.evaluate(&script).await?;
        let status = value.get("status").and_then(Value::as_u64).unwrap_or(0) as u16;
        let body = value
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(SessionFetch { status, body })
    }

    async fn cookies(&self) -> Result<Vec<(String, String)>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .context("failed to read session cookies")?;
        Ok(cookies.into_iter().map(|c| (c.name, c.value)).collect())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let _ = self.page.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrowserConfig;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_launch_and_evaluate() {
        let host = ChromiumHost::launch(&BrowserConfig::default())
            .await
            .expect("failed to launch");
        let surfaces = host.surfaces().await.expect("failed to list surfaces");
        assert!(!surfaces.is_empty());

        let surface = surfaces.into_iter().next().unwrap();
        let value = surface
            .evaluate("1 + 2")
            .await
            .expect("evaluation failed");
        assert_eq!(value.as_u64(), Some(3));

        surface.close().await.expect("close failed");
        Box::new(host).close().await.expect("host close failed");
    }
}
