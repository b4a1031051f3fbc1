//! Session key resolution.
//!
//! Derives which session a call belongs to, in strict precedence:
//! caller-supplied key, then the target's host for navigation calls,
//! then a fallback policy. The fallback policy refuses to guess: with
//! two or more live sessions and nothing to disambiguate by, the call
//! gets a freshly minted key rather than someone else's open page.

use url::Url;
use uuid::Uuid;

use crate::tools;

/// Fixed key used when no sessions exist and nothing disambiguates.
pub const FALLBACK_KEY: &str = "default";

/// Session priority class; drives idle timeouts and eviction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionClass {
    /// Caller pinned this session by explicit key.
    Pinned,
    /// Derived from a navigation target's host.
    Domain,
    /// Fallback or minted; first to go under pressure.
    Fallback,
}

#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub key: String,
    pub class: SessionClass,
    /// True when the ambiguity rule fired and a fresh key was minted.
    pub ambiguous: bool,
}

/// Resolve the session key for a call.
///
/// Deterministic for a given (explicit, target) pair within one process
/// lifetime; only the ambiguity branch mints.
pub fn resolve(
    explicit: Option<&str>,
    tool: &str,
    target_url: Option<&str>,
    existing: &[String],
) -> ResolvedKey {
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return ResolvedKey {
            key: key.to_string(),
            class: SessionClass::Pinned,
            ambiguous: false,
        };
    }

    if tools::is_navigation_class(tool) {
        if let Some(host) = target_url.and_then(host_of) {
            return ResolvedKey {
                key: format!("auto_{}", normalize_host(&host)),
                class: SessionClass::Domain,
                ambiguous: false,
            };
        }
    }

    // Follow-up action with no key: safe only when intent is
    // unambiguous.
    match existing.len() {
        // Keep the reused session's own class: a dead page recreated
        // under this key must come back with the same profile and idle
        // timeout it had before.
        1 => ResolvedKey {
            key: existing[0].clone(),
            class: implied_class(&existing[0]),
            ambiguous: false,
        },
        0 => ResolvedKey {
            key: FALLBACK_KEY.to_string(),
            class: SessionClass::Fallback,
            ambiguous: false,
        },
        _ => ResolvedKey {
            key: format!("anon_{}", Uuid::now_v7().simple()),
            class: SessionClass::Fallback,
            ambiguous: true,
        },
    }
}

/// Class a key carries by construction: derived keys keep their
/// `auto_`/`anon_` prefixes, `default` is the fixed fallback, anything
/// else was pinned by a caller.
fn implied_class(key: &str) -> SessionClass {
    if key.starts_with("auto_") {
        SessionClass::Domain
    } else if key == FALLBACK_KEY || key.starts_with("anon_") {
        SessionClass::Fallback
    } else {
        SessionClass::Pinned
    }
}

fn host_of(target: &str) -> Option<String> {
    Url::parse(target)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

/// Identifier-safe host: lowercase, everything outside [a-z0-9] maps
/// to underscore.
fn normalize_host(host: &str) -> String {
    host.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn explicit_key_wins() {
        let resolved = resolve(
            Some("my-workflow"),
            "navigate_to_url",
            Some("https://a.example/x"),
            &keys(&["other"]),
        );
        assert_eq!(resolved.key, "my-workflow");
        assert_eq!(resolved.class, SessionClass::Pinned);
    }

    #[test]
    fn navigation_derives_host_key() {
        let resolved = resolve(None, "navigate_to_url", Some("https://a.example/x"), &[]);
        assert_eq!(resolved.key, "auto_a_example");
        assert_eq!(resolved.class, SessionClass::Domain);
    }

    #[test]
    fn derivation_is_deterministic() {
        let first = resolve(None, "navigate_to_url", Some("https://A.Example/one"), &[]);
        let second = resolve(
            None,
            "navigate_to_url",
            Some("https://a.example/two"),
            &keys(&["auto_a_example"]),
        );
        assert_eq!(first.key, second.key);
    }

    #[test]
    fn single_session_is_reused() {
        let resolved = resolve(None, "get_page_content", None, &keys(&["auto_a_example"]));
        assert_eq!(resolved.key, "auto_a_example");
        assert!(!resolved.ambiguous);
    }

    #[test]
    fn single_session_reuse_keeps_the_key_class() {
        let resolved = resolve(None, "get_page_content", None, &keys(&["auto_a_example"]));
        assert_eq!(resolved.class, SessionClass::Domain);

        let resolved = resolve(None, "get_page_content", None, &keys(&["job-42"]));
        assert_eq!(resolved.class, SessionClass::Pinned);

        let resolved = resolve(None, "get_page_content", None, &keys(&["anon_0af7"]));
        assert_eq!(resolved.class, SessionClass::Fallback);

        let resolved = resolve(None, "get_page_content", None, &keys(&[FALLBACK_KEY]));
        assert_eq!(resolved.class, SessionClass::Fallback);
    }

    #[test]
    fn no_sessions_fall_back_to_default() {
        let resolved = resolve(None, "get_page_content", None, &[]);
        assert_eq!(resolved.key, FALLBACK_KEY);
    }

    #[test]
    fn ambiguity_mints_distinct_keys() {
        let live = keys(&["auto_a_example", "auto_b_example"]);
        let first = resolve(None, "get_page_content", None, &live);
        let second = resolve(None, "get_page_content", None, &live);

        assert!(first.ambiguous && second.ambiguous);
        assert_ne!(first.key, second.key);
        assert!(!live.contains(&first.key));
        assert!(first.key.starts_with("anon_"));
    }

    #[test]
    fn host_normalization_is_identifier_safe() {
        assert_eq!(normalize_host("sub.a-b.example"), "sub_a_b_example");
    }
}
