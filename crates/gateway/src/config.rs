//! Environment-driven configuration.
//!
//! Every knob has a default that works for a local headless run;
//! `GATEWAY_*` variables override them.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Hard cap on simultaneously open sessions.
    pub max_sessions: usize,

    /// Idle timeout for explicit and domain-derived sessions.
    pub domain_idle_timeout: Duration,

    /// Idle timeout for fallback and minted sessions; these are cheap
    /// to recreate, so they expire sooner.
    pub fallback_idle_timeout: Duration,

    /// Period of the maintenance sweep, independent of call traffic.
    pub sweep_interval: Duration,

    /// Bound on navigation (including document readiness).
    pub navigation_timeout: Duration,

    /// Bound on element interaction and read operations.
    pub action_timeout: Duration,

    pub headless: bool,

    /// Explicit chromium path; discovered on PATH when unset.
    pub chromium_binary: Option<PathBuf>,

    /// Credentials for the one-shot login heuristic on navigation.
    pub login: Option<LoginConfig>,
}

#[derive(Debug, Clone)]
pub struct LoginConfig {
    pub username: String,
    pub password: String,
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_sessions: 8,
            domain_idle_timeout: Duration::from_secs(600),
            fallback_idle_timeout: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(60),
            navigation_timeout: Duration::from_secs(30),
            action_timeout: Duration::from_secs(10),
            headless: true,
            chromium_binary: None,
            login: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_sessions: env_parse("GATEWAY_MAX_SESSIONS", defaults.max_sessions),
            domain_idle_timeout: env_secs(
                "GATEWAY_DOMAIN_IDLE_SECS",
                defaults.domain_idle_timeout,
            ),
            fallback_idle_timeout: env_secs(
                "GATEWAY_FALLBACK_IDLE_SECS",
                defaults.fallback_idle_timeout,
            ),
            sweep_interval: env_secs("GATEWAY_SWEEP_SECS", defaults.sweep_interval),
            navigation_timeout: env_secs("GATEWAY_NAV_TIMEOUT_SECS", defaults.navigation_timeout),
            action_timeout: env_secs("GATEWAY_ACTION_TIMEOUT_SECS", defaults.action_timeout),
            headless: env_parse("GATEWAY_HEADLESS", defaults.headless),
            chromium_binary: std::env::var("GATEWAY_CHROMIUM_BINARY")
                .ok()
                .map(PathBuf::from),
            login: LoginConfig::from_env(),
        }
    }
}

impl LoginConfig {
    /// Present only when both credentials are set.
    fn from_env() -> Option<Self> {
        let username = std::env::var("GATEWAY_LOGIN_USERNAME").ok()?;
        let password = std::env::var("GATEWAY_LOGIN_PASSWORD").ok()?;
        Some(Self {
            username,
            password,
            username_selector: env_string(
                "GATEWAY_LOGIN_USERNAME_SELECTOR",
                "input[type=email], input[type=text][name*=user]",
            ),
            password_selector: env_string(
                "GATEWAY_LOGIN_PASSWORD_SELECTOR",
                "input[type=password]",
            ),
            submit_selector: env_string(
                "GATEWAY_LOGIN_SUBMIT_SELECTOR",
                "button[type=submit], input[type=submit]",
            ),
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
