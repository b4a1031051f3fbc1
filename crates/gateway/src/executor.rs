//! Action executor: maps a named tool call onto page operations.
//!
//! Validation failures surface as `InvalidArguments` before the page is
//! touched; page failures map through the error taxonomy so callers can
//! distinguish a slow page (`action_timeout`) from a wrong selector
//! (`action_target_not_found`).

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use browser::Page;

use crate::config::{Config, LoginConfig};
use crate::error::GatewayError;

/// Upper bound on explicit waits; keeps one caller from parking a
/// session indefinitely.
const MAX_WAIT: Duration = Duration::from_secs(30);

/// Collects anchor hrefs with their visible text, absolute URLs only.
const EXTRACT_LINKS_SCRIPT: &str = r#"(() => {
    return Array.from(document.querySelectorAll('a[href]'))
        .map(a => ({ href: a.href, text: (a.textContent || '').trim() }))
        .filter(l => l.href.startsWith('http'));
})()"#;

/// Pulls the common document metadata: title, description, canonical
/// URL and Open Graph tags.
const EXTRACT_METADATA_SCRIPT: &str = r#"(() => {
    const meta = {};
    meta.title = document.title || null;
    meta.url = location.href;
    const pick = (sel, attr) => {
        const el = document.querySelector(sel);
        return el ? el.getAttribute(attr) : null;
    };
    meta.description = pick('meta[name="description"]', 'content');
    meta.canonical = pick('link[rel="canonical"]', 'href');
    meta.og = {};
    for (const el of document.querySelectorAll('meta[property^="og:"]')) {
        meta.og[el.getAttribute('property').slice(3)] = el.getAttribute('content');
    }
    return meta;
})()"#;

/// True when the current document shows a password field, the cue for
/// the scripted-login pass.
const LOGIN_DETECT_SCRIPT: &str =
    r#"document.querySelector('input[type="password"]') !== null"#;

#[derive(Deserialize)]
struct NavigateArgs {
    url: String,
}

#[derive(Deserialize)]
struct WaitArgs {
    #[serde(default = "default_wait_seconds")]
    seconds: u64,
}

fn default_wait_seconds() -> u64 {
    2
}

#[derive(Deserialize)]
struct FillArgs {
    selector: String,
    value: String,
}

#[derive(Deserialize)]
struct ClickArgs {
    selector: String,
    timeout: Option<u64>,
}

#[derive(Deserialize)]
struct ScreenshotArgs {
    filename: Option<String>,
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, args: &Value) -> Result<T, GatewayError> {
    serde_json::from_value(args.clone()).map_err(|e| GatewayError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Run one tool against one page. The caller has already resolved the
/// session; `cleanup_resources` never reaches here.
pub async fn execute(
    page: &Arc<dyn Page>,
    tool: &str,
    args: &Value,
    config: &Config,
) -> Result<Value, GatewayError> {
    match tool {
        "navigate_to_url" => navigate(page, args, config).await,
        "wait_for_content" => wait_for_content(args).await,
        "fill_form" => fill_form(page, args, config).await,
        "click_element" => click_element(page, args, config).await,
        "get_page_content" => {
            let content = bounded(config.action_timeout, page.text()).await?;
            Ok(json!({ "content": content, "length": content.len() }))
        }
        "get_page_html" => {
            let content = bounded(config.action_timeout, page.html()).await?;
            Ok(json!({ "content": content, "length": content.len() }))
        }
        "capture_screenshot" => capture_screenshot(page, args, config).await,
        "extract_links" => {
            let links = page
                .extract(EXTRACT_LINKS_SCRIPT, config.action_timeout)
                .await?;
            // An empty page yields an empty list, not an error.
            let links = match links {
                Value::Array(items) => items,
                _ => Vec::new(),
            };
            Ok(json!({ "count": links.len(), "links": links }))
        }
        "extract_metadata" => {
            let metadata = page
                .extract(EXTRACT_METADATA_SCRIPT, config.action_timeout)
                .await?;
            Ok(json!({ "metadata": metadata }))
        }
        other => Err(GatewayError::UnknownTool(other.to_string())),
    }
}

async fn navigate(
    page: &Arc<dyn Page>,
    args: &Value,
    config: &Config,
) -> Result<Value, GatewayError> {
    let args: NavigateArgs = parse_args("navigate_to_url", args)?;
    let url = Url::parse(&args.url).map_err(|e| GatewayError::InvalidArguments {
        tool: "navigate_to_url".to_string(),
        message: format!("invalid url {:?}: {e}", args.url),
    })?;

    page.navigate(url.as_str(), config.navigation_timeout).await?;

    let mut logged_in = false;
    if let Some(login) = &config.login {
        logged_in = maybe_login(page, login, config).await?;
        if logged_in {
            // One pass back through the original target now that the
            // session is authenticated.
            page.navigate(url.as_str(), config.navigation_timeout).await?;
        }
    }

    let final_url = page.url().await?;
    Ok(json!({
        "url": final_url,
        "status": "loaded",
        "logged_in": logged_in,
    }))
}

/// If the landed page shows a login form, fill it from the configured
/// credentials and submit once. A form that persists after submission
/// means the credentials did not take.
async fn maybe_login(
    page: &Arc<dyn Page>,
    login: &LoginConfig,
    config: &Config,
) -> Result<bool, GatewayError> {
    let detected = page
        .extract(LOGIN_DETECT_SCRIPT, config.action_timeout)
        .await?;
    if detected != Value::Bool(true) {
        return Ok(false);
    }

    tracing::info!("login form detected; submitting configured credentials");
    let auth_err = |e: browser::PageError| {
        GatewayError::ActionAuthenticationRequired(format!("scripted login failed: {e}"))
    };
    page.fill(&login.username_selector, &login.username, config.action_timeout)
        .await
        .map_err(auth_err)?;
    page.fill(&login.password_selector, &login.password, config.action_timeout)
        .await
        .map_err(auth_err)?;
    page.click(&login.submit_selector, config.action_timeout)
        .await
        .map_err(auth_err)?;

    // Give the form submission a moment to land before re-checking.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let still_there = page
        .extract(LOGIN_DETECT_SCRIPT, config.action_timeout)
        .await?;
    if still_there == Value::Bool(true) {
        return Err(GatewayError::ActionAuthenticationRequired(
            "login form persisted after credential submission".to_string(),
        ));
    }
    Ok(true)
}

async fn wait_for_content(args: &Value) -> Result<Value, GatewayError> {
    let args: WaitArgs = parse_args("wait_for_content", args)?;
    let wait = Duration::from_secs(args.seconds).min(MAX_WAIT);
    tokio::time::sleep(wait).await;
    Ok(json!({ "waited_seconds": wait.as_secs() }))
}

async fn fill_form(
    page: &Arc<dyn Page>,
    args: &Value,
    config: &Config,
) -> Result<Value, GatewayError> {
    let args: FillArgs = parse_args("fill_form", args)?;
    page.fill(&args.selector, &args.value, config.action_timeout)
        .await?;
    Ok(json!({ "selector": args.selector, "status": "filled" }))
}

async fn click_element(
    page: &Arc<dyn Page>,
    args: &Value,
    config: &Config,
) -> Result<Value, GatewayError> {
    let args: ClickArgs = parse_args("click_element", args)?;
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or(config.action_timeout);
    page.click(&args.selector, timeout).await?;
    Ok(json!({ "selector": args.selector, "status": "clicked" }))
}

async fn capture_screenshot(
    page: &Arc<dyn Page>,
    args: &Value,
    config: &Config,
) -> Result<Value, GatewayError> {
    let args: ScreenshotArgs = parse_args("capture_screenshot", args)?;
    let shot = bounded(config.action_timeout, page.screenshot()).await?;
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut result = json!({
        "data": shot.data_base64,
        "width": shot.width,
        "height": shot.height,
        "size_bytes": shot.byte_len(),
        "url": shot.url,
        "timestamp": timestamp,
    });
    if let Some(filename) = args.filename {
        result["filename"] = Value::String(filename);
    }
    Ok(result)
}

/// Bound a page operation that carries no deadline of its own.
async fn bounded<T>(
    limit: Duration,
    fut: impl std::future::Future<Output = Result<T, browser::PageError>>,
) -> Result<T, GatewayError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(GatewayError::ActionTimeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakePage;

    fn page() -> (Arc<dyn Page>, FakePage) {
        let fake = FakePage::new();
        (Arc::new(fake.clone()), fake)
    }

    fn config() -> Config {
        Config::default()
    }

    #[tokio::test]
    async fn navigate_records_url_and_reports_loaded() {
        let (page, fake) = page();
        let result = execute(
            &page,
            "navigate_to_url",
            &json!({ "url": "https://a.example/dash" }),
            &config(),
        )
        .await
        .unwrap();

        assert_eq!(result["status"], "loaded");
        assert_eq!(result["url"], "https://a.example/dash");
        assert_eq!(fake.navigations(), vec!["https://a.example/dash"]);
    }

    #[tokio::test]
    async fn navigate_rejects_malformed_url_before_touching_page() {
        let (page, fake) = page();
        let err = execute(
            &page,
            "navigate_to_url",
            &json!({ "url": "not a url" }),
            &config(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), "invalid_arguments");
        assert!(fake.navigations().is_empty());
    }

    #[tokio::test]
    async fn navigation_failure_maps_to_its_own_kind() {
        let (page, fake) = page();
        fake.fail_navigation("net::ERR_NAME_NOT_RESOLVED");
        let err = execute(
            &page,
            "navigate_to_url",
            &json!({ "url": "https://bad.example/" }),
            &config(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "navigation_failed");
    }

    #[tokio::test]
    async fn missing_selector_and_slow_selector_are_distinct_failures() {
        let (page, fake) = page();
        fake.mark_missing("#gone");
        fake.mark_hanging("#busy");

        let err = execute(
            &page,
            "click_element",
            &json!({ "selector": "#gone" }),
            &config(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "action_target_not_found");

        let err = execute(
            &page,
            "click_element",
            &json!({ "selector": "#busy" }),
            &config(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "action_timeout");
    }

    #[tokio::test]
    async fn fill_requires_both_selector_and_value() {
        let (page, _fake) = page();
        let err = execute(
            &page,
            "fill_form",
            &json!({ "selector": "#user" }),
            &config(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
    }

    #[tokio::test]
    async fn fill_reports_the_filled_selector() {
        let (page, fake) = page();
        let result = execute(
            &page,
            "fill_form",
            &json!({ "selector": "#user", "value": "alice" }),
            &config(),
        )
        .await
        .unwrap();
        assert_eq!(result["status"], "filled");
        assert_eq!(fake.fills(), vec![("#user".to_string(), "alice".to_string())]);
    }

    #[tokio::test]
    async fn page_content_comes_back_with_length() {
        let (page, fake) = page();
        fake.set_text("hello world");
        let result = execute(&page, "get_page_content", &json!({}), &config())
            .await
            .unwrap();
        assert_eq!(result["content"], "hello world");
        assert_eq!(result["length"], 11);
    }

    #[tokio::test]
    async fn page_html_is_the_raw_document() {
        let (page, fake) = page();
        fake.set_html("<html><body>hi</body></html>");
        let result = execute(&page, "get_page_html", &json!({}), &config())
            .await
            .unwrap();
        assert_eq!(result["content"], "<html><body>hi</body></html>");
    }

    #[tokio::test]
    async fn empty_link_extraction_is_a_success() {
        let (page, fake) = page();
        fake.push_extract(json!([]));
        let result = execute(&page, "extract_links", &json!({}), &config())
            .await
            .unwrap();
        assert_eq!(result["count"], 0);
        assert_eq!(result["links"], json!([]));
    }

    #[tokio::test]
    async fn link_extraction_counts_results() {
        let (page, fake) = page();
        fake.push_extract(json!([
            { "href": "https://a.example/x", "text": "X" },
            { "href": "https://a.example/y", "text": "Y" },
        ]));
        let result = execute(&page, "extract_links", &json!({}), &config())
            .await
            .unwrap();
        assert_eq!(result["count"], 2);
    }

    #[tokio::test]
    async fn screenshot_carries_dimensions_and_source_url() {
        let (page, fake) = page();
        fake.navigate("https://a.example/", Duration::from_secs(1))
            .await
            .unwrap();
        let result = execute(
            &page,
            "capture_screenshot",
            &json!({ "filename": "dash.png" }),
            &config(),
        )
        .await
        .unwrap();
        assert_eq!(result["width"], 1280);
        assert_eq!(result["height"], 720);
        assert_eq!(result["url"], "https://a.example/");
        assert_eq!(result["filename"], "dash.png");
        assert!(result["size_bytes"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn scripted_login_runs_when_form_detected() {
        let (page, fake) = page();
        // First detection sees the form, the post-submit check does not.
        fake.push_extract(json!(true));
        fake.push_extract(json!(false));

        let mut config = config();
        config.login = Some(LoginConfig {
            username: "svc".to_string(),
            password: "hunter2".to_string(),
            username_selector: "#user".to_string(),
            password_selector: "#pass".to_string(),
            submit_selector: "#submit".to_string(),
        });

        let result = execute(
            &page,
            "navigate_to_url",
            &json!({ "url": "https://a.example/login" }),
            &config,
        )
        .await
        .unwrap();

        assert_eq!(result["logged_in"], true);
        // Original target is revisited once after the credentials land.
        assert_eq!(
            fake.navigations(),
            vec!["https://a.example/login", "https://a.example/login"]
        );
        assert_eq!(
            fake.fills(),
            vec![
                ("#user".to_string(), "svc".to_string()),
                ("#pass".to_string(), "hunter2".to_string()),
            ]
        );
        assert_eq!(fake.clicks(), vec!["#submit"]);
    }

    #[tokio::test]
    async fn persistent_login_form_means_authentication_required() {
        let (page, fake) = page();
        fake.push_extract(json!(true));
        fake.push_extract(json!(true));

        let mut config = config();
        config.login = Some(LoginConfig {
            username: "svc".to_string(),
            password: "wrong".to_string(),
            username_selector: "#user".to_string(),
            password_selector: "#pass".to_string(),
            submit_selector: "#submit".to_string(),
        });

        let err = execute(
            &page,
            "navigate_to_url",
            &json!({ "url": "https://a.example/login" }),
            &config,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "action_authentication_required");
    }

    #[tokio::test]
    async fn wait_is_capped() {
        let args: WaitArgs = serde_json::from_value(json!({ "seconds": 9999 })).unwrap();
        let wait = Duration::from_secs(args.seconds).min(MAX_WAIT);
        assert_eq!(wait, MAX_WAIT);
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let (page, _fake) = page();
        let err = execute(&page, "hack_the_planet", &json!({}), &config())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unknown_tool");
    }
}
