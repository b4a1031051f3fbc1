//! Engine lifecycle: launching one shared Chromium process and handing
//! out isolated pages from it.
//!
//! The process is expensive, so exactly one exists at a time. `Engine`
//! abstracts over it for the session layer; `Launcher` abstracts the
//! spawn so tests can produce fake engines without a binary on disk.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::cdp::protocol::{
    AttachToTargetResult, BrowserVersion, CreateBrowserContextResult, CreateTargetResult,
};
use crate::cdp::{CdpClient, CdpError};
use crate::page::{CdpPage, Page, PageError, PageProfile};

#[derive(Error, Debug)]
pub enum EngineError {
    /// Spawn or first connect failed. Fatal for the triggering call
    /// only; the next call starts over.
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// Liveness probe failed; the process is gone or unresponsive.
    #[error("browser engine disconnected")]
    Disconnected,

    #[error("failed to open page: {0}")]
    OpenPage(String),

    #[error(transparent)]
    Cdp(#[from] CdpError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// A running automation engine capable of opening isolated contexts.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Cheap, side-effect-free liveness probe. Any failure, timeouts
    /// included, reads as `Disconnected`.
    async fn probe(&self) -> Result<BrowserVersion>;

    /// Open one isolated browser context with one page in it.
    async fn open_page(&self, profile: &PageProfile) -> Result<Box<dyn Page>>;

    /// Best-effort memory reclamation hint. Never fails.
    async fn reclaim_memory(&self);

    /// Best-effort teardown of the whole process.
    async fn shutdown(&self);
}

/// Produces engines on demand. The registry relaunches through this
/// whenever its current engine stops probing.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Engine>>;
}

/// CDP-backed engine wrapping one Chromium child process.
pub struct CdpEngine {
    client: Arc<CdpClient>,
    process: Mutex<Option<Child>>,
}

#[async_trait]
impl Engine for CdpEngine {
    async fn probe(&self) -> Result<BrowserVersion> {
        if !self.client.is_connected() {
            return Err(EngineError::Disconnected);
        }
        let result = self
            .client
            .send_with_timeout("Browser.getVersion", None, None, Duration::from_secs(5))
            .await
            .map_err(|_| EngineError::Disconnected)?;
        serde_json::from_value(result).map_err(|_| EngineError::Disconnected)
    }

    async fn open_page(&self, profile: &PageProfile) -> Result<Box<dyn Page>> {
        let ctx: CreateBrowserContextResult = self
            .request("Target.createBrowserContext", json!({ "disposeOnDetach": false }))
            .await?;

        let target: CreateTargetResult = self
            .request(
                "Target.createTarget",
                json!({
                    "url": "about:blank",
                    "browserContextId": ctx.browser_context_id,
                }),
            )
            .await?;

        let attached: AttachToTargetResult = self
            .request(
                "Target.attachToTarget",
                json!({ "targetId": target.target_id, "flatten": true }),
            )
            .await?;

        let page = CdpPage::new(
            self.client.clone(),
            attached.session_id.clone(),
            target.target_id,
            ctx.browser_context_id,
        );

        // Enable the domains page actions rely on. Individual failures
        // are tolerated the same way the attach path always has been.
        for domain in ["Page", "Runtime", "DOM", "Network"] {
            if let Err(e) = self
                .client
                .send(format!("{domain}.enable"), None, Some(attached.session_id.clone()))
                .await
            {
                tracing::warn!("enabling {} failed: {}", domain, e);
            }
        }

        page.apply_profile(profile)
            .await
            .map_err(|e| EngineError::OpenPage(e.to_string()))?;

        Ok(Box::new(page))
    }

    async fn reclaim_memory(&self) {
        if let Err(e) = self
            .client
            .send("HeapProfiler.collectGarbage", None, None)
            .await
        {
            tracing::debug!("garbage collection hint not accepted: {}", e);
        }
    }

    async fn shutdown(&self) {
        if let Err(e) = self.client.send("Browser.close", None, None).await {
            tracing::debug!("Browser.close failed (may already be gone): {}", e);
        }
        self.client.close().await;
        if let Some(mut child) = self.process.lock().await.take() {
            let _ = child.kill().await;
        }
    }
}

impl CdpEngine {
    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T> {
        let result = self.client.send(method, Some(params), None).await?;
        serde_json::from_value(result).map_err(|e| EngineError::OpenPage(e.to_string()))
    }
}

/// Launcher that spawns a local Chromium with remote debugging enabled.
pub struct ChromiumLauncher {
    pub binary: Option<PathBuf>,
    pub headless: bool,
}

impl ChromiumLauncher {
    pub fn new(binary: Option<PathBuf>, headless: bool) -> Self {
        Self { binary, headless }
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>> {
        let binary = match &self.binary {
            Some(path) => path.clone(),
            None => find_chromium_binary()
                .ok_or_else(|| EngineError::Launch("no chromium binary found".into()))?,
        };

        let port = find_free_port().await?;
        let args = launch_args(port, self.headless);

        tracing::info!(binary = %binary.display(), port, "launching browser engine");

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Launch(format!("{}: {}", binary.display(), e)))?;

        let ws_url = wait_for_devtools(port, Duration::from_secs(15)).await?;
        let client = CdpClient::connect(&ws_url)
            .await
            .map_err(|e| EngineError::Launch(format!("cdp connect: {}", e)))?;

        tracing::info!(ws_url = %ws_url, "browser engine ready");

        Ok(Arc::new(CdpEngine {
            client,
            process: Mutex::new(Some(child)),
        }))
    }
}

fn launch_args(port: u16, headless: bool) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", port),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--metrics-recording-only".to_string(),
        "--password-store=basic".to_string(),
    ];
    if headless {
        args.push("--headless=new".to_string());
    }
    args.push("about:blank".to_string());
    args
}

/// Search well-known locations, then PATH.
pub fn find_chromium_binary() -> Option<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    };

    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.is_absolute() && path.exists() {
            return Some(path);
        }
        if !path.is_absolute() {
            if let Ok(found) = which::which(candidate) {
                return Some(found);
            }
        }
    }
    None
}

async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| EngineError::Launch(format!("port probe: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| EngineError::Launch(format!("port probe: {}", e)))?
        .port();
    drop(listener);
    Ok(port)
}

/// Poll /json/version until the browser answers with its WebSocket URL.
async fn wait_for_devtools(port: u16, timeout: Duration) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/version", port);
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if let Some(ws_url) = body
                    .get("webSocketDebuggerUrl")
                    .and_then(Value::as_str)
                {
                    return Ok(ws_url.to_string());
                }
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(EngineError::Launch(format!(
                "devtools endpoint not ready after {:?} on port {}",
                timeout, port
            )));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

impl From<PageError> for EngineError {
    fn from(e: PageError) -> Self {
        EngineError::OpenPage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_flag_is_optional() {
        let headless = launch_args(9222, true);
        assert!(headless.iter().any(|a| a == "--headless=new"));
        assert!(headless.iter().any(|a| a == "--remote-debugging-port=9222"));

        let headed = launch_args(9222, false);
        assert!(!headed.iter().any(|a| a.starts_with("--headless")));
    }

    #[tokio::test]
    async fn free_port_is_plausible() {
        let port = find_free_port().await.unwrap();
        assert!(port > 0);
    }
}
