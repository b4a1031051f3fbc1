//! In-memory fakes for the browser traits, so registry, executor and
//! dispatch tests run without a browser process.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use browser::cdp::BrowserVersion;
use browser::{Engine, EngineError, Launcher, Page, PageError, PageProfile, Screenshot};

#[derive(Default)]
struct FakePageState {
    alive: AtomicBool,
    close_fails: AtomicBool,
    closed: AtomicBool,
    navigate_error: Mutex<Option<String>>,
    navigations: Mutex<Vec<String>>,
    fills: Mutex<Vec<(String, String)>>,
    clicks: Mutex<Vec<String>>,
    missing_selectors: Mutex<HashSet<String>>,
    hanging_selectors: Mutex<HashSet<String>>,
    extract_queue: Mutex<VecDeque<Value>>,
    text: Mutex<String>,
    html: Mutex<String>,
    url: Mutex<String>,
}

#[derive(Clone)]
pub(crate) struct FakePage {
    state: Arc<FakePageState>,
}

impl FakePage {
    pub fn new() -> Self {
        let state = FakePageState::default();
        state.alive.store(true, Ordering::SeqCst);
        *state.url.lock().unwrap() = "about:blank".to_string();
        Self {
            state: Arc::new(state),
        }
    }

    pub fn set_alive(&self, alive: bool) {
        self.state.alive.store(alive, Ordering::SeqCst);
    }

    pub fn fail_close(&self) {
        self.state.close_fails.store(true, Ordering::SeqCst);
    }

    pub fn closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn fail_navigation(&self, message: &str) {
        *self.state.navigate_error.lock().unwrap() = Some(message.to_string());
    }

    /// Subsequent `fill`/`click` on this selector reports the element
    /// as missing.
    pub fn mark_missing(&self, selector: &str) {
        self.state
            .missing_selectors
            .lock()
            .unwrap()
            .insert(selector.to_string());
    }

    /// Subsequent `fill`/`click` on this selector times out.
    pub fn mark_hanging(&self, selector: &str) {
        self.state
            .hanging_selectors
            .lock()
            .unwrap()
            .insert(selector.to_string());
    }

    pub fn push_extract(&self, value: Value) {
        self.state.extract_queue.lock().unwrap().push_back(value);
    }

    pub fn set_text(&self, text: &str) {
        *self.state.text.lock().unwrap() = text.to_string();
    }

    pub fn set_html(&self, html: &str) {
        *self.state.html.lock().unwrap() = html.to_string();
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.navigations.lock().unwrap().clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.state.fills.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.clicks.lock().unwrap().clone()
    }

    fn check_selector(&self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        if self
            .state
            .hanging_selectors
            .lock()
            .unwrap()
            .contains(selector)
        {
            return Err(PageError::Timeout(timeout));
        }
        if self
            .state
            .missing_selectors
            .lock()
            .unwrap()
            .contains(selector)
        {
            return Err(PageError::TargetNotFound(selector.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Page for FakePage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), PageError> {
        if let Some(message) = self.state.navigate_error.lock().unwrap().clone() {
            return Err(PageError::Navigation(message));
        }
        self.state
            .navigations
            .lock()
            .unwrap()
            .push(url.to_string());
        *self.state.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str, timeout: Duration) -> Result<(), PageError> {
        self.check_selector(selector, timeout)?;
        self.state
            .fills
            .lock()
            .unwrap()
            .push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        self.check_selector(selector, timeout)?;
        self.state.clicks.lock().unwrap().push(selector.to_string());
        Ok(())
    }

    async fn text(&self) -> Result<String, PageError> {
        Ok(self.state.text.lock().unwrap().clone())
    }

    async fn html(&self) -> Result<String, PageError> {
        Ok(self.state.html.lock().unwrap().clone())
    }

    async fn screenshot(&self) -> Result<Screenshot, PageError> {
        Ok(Screenshot {
            data_base64: "iVBORw0KGgoAAAANSUhEUg==".to_string(),
            width: 1280,
            height: 720,
            url: self.state.url.lock().unwrap().clone(),
        })
    }

    async fn extract(&self, _script: &str, _timeout: Duration) -> Result<Value, PageError> {
        Ok(self
            .state
            .extract_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Value::Null))
    }

    async fn url(&self) -> Result<String, PageError> {
        Ok(self.state.url.lock().unwrap().clone())
    }

    async fn is_alive(&self) -> bool {
        self.state.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), PageError> {
        self.state.closed.store(true, Ordering::SeqCst);
        if self.state.close_fails.load(Ordering::SeqCst) {
            return Err(PageError::Evaluate("page already detached".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeEngine {
    probe_ok: AtomicBool,
    shut_down: AtomicBool,
    opens: AtomicUsize,
    memory_hints: AtomicUsize,
    pages: Mutex<Vec<FakePage>>,
    profiles: Mutex<Vec<PageProfile>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        let engine = Self::default();
        engine.probe_ok.store(true, Ordering::SeqCst);
        Arc::new(engine)
    }

    pub fn set_probe_ok(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::SeqCst);
    }

    pub fn pages_opened(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn memory_hints(&self) -> usize {
        self.memory_hints.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn last_page(&self) -> FakePage {
        self.pages
            .lock()
            .unwrap()
            .last()
            .expect("no page opened yet")
            .clone()
    }

    pub fn last_profile(&self) -> PageProfile {
        self.profiles
            .lock()
            .unwrap()
            .last()
            .expect("no page opened yet")
            .clone()
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn probe(&self) -> Result<BrowserVersion, EngineError> {
        if self.probe_ok.load(Ordering::SeqCst) {
            Ok(BrowserVersion {
                product: "FakeBrowser/1.0".to_string(),
                protocol_version: "1.3".to_string(),
            })
        } else {
            Err(EngineError::Disconnected)
        }
    }

    async fn open_page(&self, profile: &PageProfile) -> Result<Box<dyn Page>, EngineError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.profiles.lock().unwrap().push(profile.clone());
        let page = FakePage::new();
        self.pages.lock().unwrap().push(page.clone());
        Ok(Box::new(page))
    }

    async fn reclaim_memory(&self) {
        self.memory_hints.fetch_add(1, Ordering::SeqCst);
    }

    async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct FakeLauncher {
    launches: AtomicUsize,
    fail_next: AtomicBool,
    engines: Mutex<Vec<Arc<FakeEngine>>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn fail_next_launch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// The most recently launched engine.
    pub fn engine(&self) -> Arc<FakeEngine> {
        self.engines
            .lock()
            .unwrap()
            .last()
            .expect("no engine launched yet")
            .clone()
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>, EngineError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Launch("no usable browser binary".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        let engine = FakeEngine::new();
        self.engines.lock().unwrap().push(engine.clone());
        Ok(engine)
    }
}
