//! Static tool catalog.
//!
//! Read-only after startup; every transport serves the same list. Each
//! entry is the MCP-shaped tool object (name, description, input
//! schema). All tools additionally accept an optional `session_id` to
//! pin the call to a named session.

use serde_json::{json, Value};

pub const TOOL_NAMES: &[&str] = &[
    "navigate_to_url",
    "wait_for_content",
    "fill_form",
    "click_element",
    "get_page_content",
    "get_page_html",
    "capture_screenshot",
    "extract_links",
    "extract_metadata",
    "cleanup_resources",
];

pub fn exists(name: &str) -> bool {
    TOOL_NAMES.contains(&name)
}

/// Tools whose target address participates in session key derivation.
pub fn is_navigation_class(name: &str) -> bool {
    name == "navigate_to_url"
}

/// Full catalog as served by `tools/list`.
pub fn catalog() -> Vec<Value> {
    vec![
        tool(
            "navigate_to_url",
            "Navigate the session's page to a URL and wait for it to load.",
            json!({
                "url": { "type": "string", "description": "Target address (http/https)" },
            }),
            &["url"],
        ),
        tool(
            "wait_for_content",
            "Give a slow page time to settle before the next action.",
            json!({
                "seconds": { "type": "number", "description": "Seconds to wait (capped at 30)" },
            }),
            &["seconds"],
        ),
        tool(
            "fill_form",
            "Fill a form field identified by CSS selector.",
            json!({
                "selector": { "type": "string" },
                "value": { "type": "string" },
            }),
            &["selector", "value"],
        ),
        tool(
            "click_element",
            "Click the element identified by CSS selector.",
            json!({
                "selector": { "type": "string" },
                "timeout": { "type": "number", "description": "Seconds to wait for the element" },
            }),
            &["selector"],
        ),
        tool(
            "get_page_content",
            "Rendered text of the current page.",
            json!({}),
            &[],
        ),
        tool(
            "get_page_html",
            "Full HTML markup of the current page.",
            json!({}),
            &[],
        ),
        tool(
            "capture_screenshot",
            "Capture the viewport as a base64 PNG with metadata.",
            json!({
                "filename": { "type": "string", "description": "Echoed back in metadata" },
            }),
            &[],
        ),
        tool(
            "extract_links",
            "Extract hyperlinks (href + text) from the current page. \
             An empty list means nothing matched, not an error.",
            json!({}),
            &[],
        ),
        tool(
            "extract_metadata",
            "Extract document metadata (title, meta tags, canonical URL).",
            json!({}),
            &[],
        ),
        tool(
            "cleanup_resources",
            "Tear down one session, or every session plus the engine.",
            json!({
                "session_id": { "type": "string", "description": "Session to close; omit for all" },
            }),
            &[],
        ),
    ]
}

fn tool(name: &str, description: &str, mut properties: Value, required: &[&str]) -> Value {
    // Every tool accepts an optional session pin.
    if name != "cleanup_resources" {
        properties["session_id"] = json!({
            "type": "string",
            "description": "Explicit session key; derived from the call when omitted",
        });
    }
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required,
        },
    })
}
