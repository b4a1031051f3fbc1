//! Session registry: the one owner of shared mutable state.
//!
//! A single `Mutex` guards both the session table and the engine
//! handle, so every mutation (create, evict, sweep, teardown) is atomic
//! relative to the others. Concurrent `get_or_create` calls for the
//! same key serialize here and converge on one session; nothing else in
//! the process touches the table.
//!
//! Cleanup never leaves a dangling entry: page teardown failures are
//! logged and the entry is removed regardless.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use browser::{Engine, Launcher, Page, PageProfile};

use crate::config::Config;
use crate::error::GatewayError;
use crate::resolver::SessionClass;

/// Desktop user agent applied to domain-derived sessions so target
/// sites see a conventional browser.
const DOMAIN_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

struct SessionEntry {
    page: Arc<dyn Page>,
    class: SessionClass,
    last_used: Instant,
}

struct Inner {
    engine: Option<Arc<dyn Engine>>,
    sessions: HashMap<String, SessionEntry>,
}

pub struct SessionRegistry {
    launcher: Arc<dyn Launcher>,
    config: Arc<Config>,
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub fn new(launcher: Arc<dyn Launcher>, config: Arc<Config>) -> Self {
        Self {
            launcher,
            config,
            inner: Mutex::new(Inner {
                engine: None,
                sessions: HashMap::new(),
            }),
        }
    }

    /// Snapshot of live session keys, for the resolver and health
    /// endpoint.
    pub async fn live_keys(&self) -> Vec<String> {
        self.inner.lock().await.sessions.keys().cloned().collect()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    pub async fn engine_state(&self) -> &'static str {
        match self.inner.lock().await.engine {
            Some(_) => "ready",
            None => "absent",
        }
    }

    /// Resolve a key to its session, creating it if needed.
    ///
    /// An existing session is reused only if its page still answers a
    /// liveness probe; a dead one is discarded and recreated under the
    /// same key. Creation may evict (capacity) and may relaunch the
    /// engine (probe failure).
    pub async fn get_or_create(
        &self,
        key: &str,
        class: SessionClass,
    ) -> Result<Arc<dyn Page>, GatewayError> {
        let mut inner = self.inner.lock().await;

        if let Some(entry) = inner.sessions.get(key) {
            if entry.page.is_alive().await {
                return Ok(entry.page.clone());
            }
            tracing::info!(key, "session page no longer responds; recreating");
            if let Some(entry) = inner.sessions.remove(key) {
                close_page(key, &entry.page).await;
            }
        }

        if inner.sessions.len() >= self.config.max_sessions {
            Self::evict_one(&mut inner).await;
        }

        let engine = self.acquire_engine(&mut inner).await?;
        let profile = self.profile_for(class);
        let page: Arc<dyn Page> = Arc::from(engine.open_page(&profile).await?);

        tracing::info!(key, ?class, "session created");
        inner.sessions.insert(
            key.to_string(),
            SessionEntry {
                page: page.clone(),
                class,
                last_used: Instant::now(),
            },
        );

        Ok(page)
    }

    /// Record a successful use of the session.
    pub async fn touch(&self, key: &str) {
        if let Some(entry) = self.inner.lock().await.sessions.get_mut(key) {
            entry.last_used = Instant::now();
        }
    }

    /// Remove sessions whose idle age exceeds their class timeout.
    /// Returns how many went away.
    pub async fn sweep_idle(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let expired: Vec<String> = inner
            .sessions
            .iter()
            .filter(|(_, entry)| {
                now.duration_since(entry.last_used) > self.idle_timeout(entry.class)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(entry) = inner.sessions.remove(key) {
                tracing::info!(key, "session expired");
                close_page(key, &entry.page).await;
            }
        }
        expired.len()
    }

    /// Forward a memory-reclamation hint to the engine, if any.
    pub async fn memory_hint(&self) {
        let engine = self.inner.lock().await.engine.clone();
        if let Some(engine) = engine {
            engine.reclaim_memory().await;
        }
    }

    /// Tear down one session. Returns whether it existed.
    pub async fn teardown_one(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.sessions.remove(key) {
            Some(entry) => {
                close_page(key, &entry.page).await;
                true
            }
            None => false,
        }
    }

    /// Tear down every session and release the engine.
    pub async fn teardown_all(&self) {
        let mut inner = self.inner.lock().await;
        for (key, entry) in inner.sessions.drain() {
            close_page(&key, &entry.page).await;
        }
        if let Some(engine) = inner.engine.take() {
            engine.shutdown().await;
            tracing::info!("engine released");
        }
    }

    async fn acquire_engine(&self, inner: &mut Inner) -> Result<Arc<dyn Engine>, GatewayError> {
        if let Some(engine) = &inner.engine {
            if engine.probe().await.is_ok() {
                return Ok(engine.clone());
            }
            // The process died under us: every open context died with
            // it, so the whole table is invalid.
            let stale = inner.sessions.len();
            tracing::warn!(stale, "engine probe failed; discarding sessions and relaunching");
            inner.sessions.clear();
            if let Some(dead) = inner.engine.take() {
                dead.shutdown().await;
            }
        }

        let engine = self
            .launcher
            .launch()
            .await
            .map_err(|e| GatewayError::EngineUnavailable(e.to_string()))?;
        inner.engine = Some(engine.clone());
        Ok(engine)
    }

    /// Evict one session: the LRU among fallback-class sessions when
    /// any exist, else the global LRU.
    async fn evict_one(inner: &mut Inner) {
        let victim = inner
            .sessions
            .iter()
            .filter(|(_, e)| e.class == SessionClass::Fallback)
            .min_by_key(|(_, e)| e.last_used)
            .or_else(|| inner.sessions.iter().min_by_key(|(_, e)| e.last_used))
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            if let Some(entry) = inner.sessions.remove(&key) {
                tracing::info!(key, "session evicted under capacity pressure");
                close_page(&key, &entry.page).await;
            }
        }
    }

    fn idle_timeout(&self, class: SessionClass) -> Duration {
        match class {
            SessionClass::Pinned | SessionClass::Domain => self.config.domain_idle_timeout,
            SessionClass::Fallback => self.config.fallback_idle_timeout,
        }
    }

    fn profile_for(&self, class: SessionClass) -> PageProfile {
        match class {
            SessionClass::Domain => PageProfile {
                user_agent: Some(DOMAIN_USER_AGENT.to_string()),
                ..PageProfile::default()
            },
            _ => PageProfile::default(),
        }
    }
}

/// Best-effort page teardown; the registry entry is gone either way.
async fn close_page(key: &str, page: &Arc<dyn Page>) {
    if let Err(e) = page.close().await {
        tracing::warn!(key, "session teardown failed (entry removed anyway): {}", e);
    }
}
