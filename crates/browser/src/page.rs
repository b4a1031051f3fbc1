//! Page actions against one isolated browser context.
//!
//! `Page` is the seam between the session layer and the real browser:
//! the gateway's registry and dispatch code only ever see this trait,
//! so their tests run against fakes instead of a Chromium process.
//!
//! Each `CdpPage` owns exactly one browser context and one target
//! inside it. Closing the page disposes the context, which is what
//! gives sessions their isolation guarantee.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cdp::protocol::{BrowserContextId, SessionId, TargetId};
use crate::cdp::{CdpClient, CdpError};

#[derive(Error, Debug)]
pub enum PageError {
    /// The operation exceeded its deadline while the page kept working.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The locator never matched an interactable element in time.
    /// Distinct from `Timeout` so callers can tell a slow page from a
    /// structurally wrong selector.
    #[error("no element matched selector {0:?} in time")]
    TargetNotFound(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("script evaluation failed: {0}")]
    Evaluate(String),

    #[error(transparent)]
    Cdp(#[from] CdpError),
}

pub type Result<T> = std::result::Result<T, PageError>;

/// Per-session page configuration, derived from the session key by the
/// caller. Viewport and user agent vary by target; the timeouts applied
/// per operation do not live here.
#[derive(Debug, Clone)]
pub struct PageProfile {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: Option<String>,
}

impl Default for PageProfile {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 720,
            user_agent: None,
        }
    }
}

/// Captured screenshot plus the metadata callers get alongside it.
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// PNG bytes, base64-encoded exactly as CDP returns them.
    pub data_base64: String,
    pub width: u32,
    pub height: u32,
    pub url: String,
}

impl Screenshot {
    /// Decoded size estimate without paying for an actual decode.
    pub fn byte_len(&self) -> usize {
        self.data_base64.len() / 4 * 3
    }
}

/// Actions available on an open page.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait for the document to become ready, bounded by
    /// `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Fill a form field once it becomes interactable.
    async fn fill(&self, selector: &str, value: &str, timeout: Duration) -> Result<()>;

    /// Click an element once it becomes interactable.
    async fn click(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Rendered text of the page body.
    async fn text(&self) -> Result<String>;

    /// Full serialized markup.
    async fn html(&self) -> Result<String>;

    /// Capture the viewport as PNG.
    async fn screenshot(&self) -> Result<Screenshot>;

    /// Run a page-scoped extraction script. The script's return value
    /// comes back as JSON; `undefined` maps to `Value::Null`.
    async fn extract(&self, script: &str, timeout: Duration) -> Result<Value>;

    /// Current page URL.
    async fn url(&self) -> Result<String>;

    /// Cheap liveness probe. Any failure means "treat as dead".
    async fn is_alive(&self) -> bool;

    /// Tear down the page and its owning browser context.
    async fn close(&self) -> Result<()>;
}

impl std::fmt::Debug for dyn Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Page")
    }
}

/// Poll cadence for readiness and selector waits.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// CDP-backed page: one context, one target, one flat session.
pub struct CdpPage {
    client: Arc<CdpClient>,
    session_id: SessionId,
    target_id: TargetId,
    context_id: BrowserContextId,
}

impl CdpPage {
    pub fn new(
        client: Arc<CdpClient>,
        session_id: SessionId,
        target_id: TargetId,
        context_id: BrowserContextId,
    ) -> Self {
        Self {
            client,
            session_id,
            target_id,
            context_id,
        }
    }

    /// Apply the profile: viewport metrics and user agent override.
    pub async fn apply_profile(&self, profile: &PageProfile) -> Result<()> {
        self.send(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": profile.viewport_width,
                "height": profile.viewport_height,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
        )
        .await?;

        if let Some(ua) = &profile.user_agent {
            self.send("Network.setUserAgentOverride", json!({ "userAgent": ua }))
                .await?;
        }
        Ok(())
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value> {
        Ok(self
            .client
            .send(method, Some(params), Some(self.session_id.clone()))
            .await?)
    }

    /// Runtime.evaluate with returnByValue; surfaces page-side
    /// exceptions as `PageError::Evaluate`.
    async fn evaluate(&self, expression: &str, timeout: Duration) -> Result<Value> {
        let result = self
            .client
            .send_with_timeout(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
                Some(self.session_id.clone()),
                timeout,
            )
            .await
            .map_err(|e| match e {
                CdpError::Timeout(d) => PageError::Timeout(d),
                other => PageError::Cdp(other),
            })?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("unknown exception");
            return Err(PageError::Evaluate(text.to_string()));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Poll until the selector matches a visible, enabled element.
    async fn wait_interactable(&self, selector: &str, timeout: Duration) -> Result<()> {
        let selector_js = serde_json::to_string(selector).expect("string always serializes");
        let probe = format!(
            "(() => {{ const el = document.querySelector({selector_js}); \
             return !!el && !el.disabled && el.getClientRects().length > 0; }})()"
        );

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.evaluate(&probe, POLL_INTERVAL.max(Duration::from_secs(1))).await?
                == Value::Bool(true)
            {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PageError::TargetNotFound(selector.to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Page for CdpPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let result = self
            .client
            .send_with_timeout(
                "Page.navigate",
                Some(json!({ "url": url })),
                Some(self.session_id.clone()),
                timeout,
            )
            .await
            .map_err(|e| match e {
                CdpError::Timeout(d) => PageError::Timeout(d),
                other => PageError::Cdp(other),
            })?;

        // DNS and connection failures come back as errorText, not as a
        // protocol error.
        if let Some(err) = result.get("errorText").and_then(Value::as_str) {
            if !err.is_empty() {
                return Err(PageError::Navigation(err.to_string()));
            }
        }

        // Wait for document readiness rather than network quiescence;
        // long-polling pages would otherwise never settle.
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let state = self
                .evaluate("document.readyState", Duration::from_secs(5))
                .await?;
            if state.as_str() == Some("complete") || state.as_str() == Some("interactive") {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PageError::Timeout(timeout));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn fill(&self, selector: &str, value: &str, timeout: Duration) -> Result<()> {
        self.wait_interactable(selector, timeout).await?;

        let selector_js = serde_json::to_string(selector).expect("string always serializes");
        let value_js = serde_json::to_string(value).expect("string always serializes");
        let script = format!(
            "(() => {{ const el = document.querySelector({selector_js}); \
             el.focus(); el.value = {value_js}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); }})()"
        );
        self.evaluate(&script, timeout).await?;
        Ok(())
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.wait_interactable(selector, timeout).await?;

        let selector_js = serde_json::to_string(selector).expect("string always serializes");
        let script =
            format!("(() => {{ document.querySelector({selector_js}).click(); }})()");
        self.evaluate(&script, timeout).await?;
        Ok(())
    }

    async fn text(&self) -> Result<String> {
        let value = self
            .evaluate(
                "document.body ? document.body.innerText : ''",
                Duration::from_secs(10),
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn html(&self) -> Result<String> {
        let value = self
            .evaluate(
                "document.documentElement ? document.documentElement.outerHTML : ''",
                Duration::from_secs(10),
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot(&self) -> Result<Screenshot> {
        // Capture and metadata are one step; a failure in either is an
        // engine-level failure for the whole operation.
        let metrics = self.send("Page.getLayoutMetrics", json!({})).await?;
        let (width, height) = metrics
            .get("cssVisualViewport")
            .map(|v| {
                (
                    v.get("clientWidth").and_then(Value::as_f64).unwrap_or(0.0) as u32,
                    v.get("clientHeight").and_then(Value::as_f64).unwrap_or(0.0) as u32,
                )
            })
            .unwrap_or((0, 0));

        let captured = self
            .send("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let data = captured
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Screenshot {
            data_base64: data,
            width,
            height,
            url: self.url().await.unwrap_or_default(),
        })
    }

    async fn extract(&self, script: &str, timeout: Duration) -> Result<Value> {
        self.evaluate(script, timeout).await
    }

    async fn url(&self) -> Result<String> {
        let value = self
            .evaluate("window.location.href", Duration::from_secs(5))
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_alive(&self) -> bool {
        self.evaluate("1", Duration::from_secs(3)).await.is_ok()
    }

    async fn close(&self) -> Result<()> {
        self.client
            .send(
                "Target.closeTarget",
                Some(json!({ "targetId": self.target_id })),
                None,
            )
            .await?;
        self.client
            .send(
                "Target.disposeBrowserContext",
                Some(json!({ "browserContextId": self.context_id })),
                None,
            )
            .await?;
        Ok(())
    }
}
