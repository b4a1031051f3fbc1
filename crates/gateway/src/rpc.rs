//! JSON-RPC 2.0 dispatch shared by both transports.
//!
//! One string in, at most one string out. Transport code never sees the
//! envelope; it hands raw lines (or bodies) to [`handle_raw`] and ships
//! whatever comes back.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::GatewayError;
use crate::executor;
use crate::registry::SessionRegistry;
use crate::resolver::{self, ResolvedKey};
use crate::tools;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Everything a dispatch needs, shared across transports and the
/// maintenance loop.
pub struct GatewayState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<Config>,
    pub started: Instant,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(registry: Arc<SessionRegistry>, config: Arc<Config>) -> SharedState {
        Arc::new(Self {
            registry,
            config,
            started: Instant::now(),
        })
    }
}

/// Handle one raw JSON-RPC message. `None` means no response is owed
/// (a notification).
pub async fn handle_raw(state: &SharedState, raw: &str) -> Option<String> {
    let request: RpcRequest = match serde_json::from_str(raw) {
        Ok(request) => request,
        Err(e) => {
            let response =
                RpcResponse::err(Value::Null, PARSE_ERROR, format!("parse error: {e}"));
            return serde_json::to_string(&response).ok();
        }
    };

    let response = dispatch(state, request).await?;
    Some(serde_json::to_string(&response).unwrap_or_else(|e| {
        json!({
            "jsonrpc": "2.0",
            "id": Value::Null,
            "error": {
                "code": INTERNAL_ERROR,
                "message": format!("failed to encode response: {e}"),
            },
        })
        .to_string()
    }))
}

async fn dispatch(state: &SharedState, request: RpcRequest) -> Option<RpcResponse> {
    let started = Instant::now();
    let method = request.method.clone();
    tracing::debug!(%method, "rpc request");

    let response = match request.method.as_str() {
        "initialize" => Some(RpcResponse::ok(
            request.id.unwrap_or(Value::Null),
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "browser-gateway",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )),
        "notifications/initialized" => None,
        "tools/list" => Some(RpcResponse::ok(
            request.id.unwrap_or(Value::Null),
            json!({ "tools": tools::catalog() }),
        )),
        "tools/call" => Some(tools_call(state, request).await),
        other => Some(RpcResponse::err(
            request.id.unwrap_or(Value::Null),
            METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    };

    tracing::debug!(%method, elapsed_ms = started.elapsed().as_millis() as u64, "rpc done");
    response
}

async fn tools_call(state: &SharedState, request: RpcRequest) -> RpcResponse {
    let id = request.id.unwrap_or(Value::Null);
    let params = request.params.unwrap_or(Value::Null);

    let Some(tool) = params.get("name").and_then(Value::as_str) else {
        return RpcResponse::err(id, INVALID_PARAMS, "missing tool name");
    };
    let tool = tool.to_string();
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));

    if !tools::exists(&tool) {
        return RpcResponse::err(id, INVALID_PARAMS, format!("unknown tool: {tool}"));
    }

    // Resource cleanup acts on the registry itself, before any session
    // resolution could mint one.
    if tool == "cleanup_resources" {
        return RpcResponse::ok(id, cleanup(state, &arguments).await);
    }

    let explicit = arguments.get("session_id").and_then(Value::as_str);
    let target_url = arguments.get("url").and_then(Value::as_str);
    let existing = state.registry.live_keys().await;
    let ResolvedKey {
        key,
        class,
        ambiguous,
    } = resolver::resolve(explicit, &tool, target_url, &existing);
    if ambiguous {
        tracing::warn!(
            %tool,
            %key,
            live = existing.len(),
            "no session hint with several sessions live; isolating in a fresh one"
        );
    }

    let outcome = call_on_session(state, &key, class, &tool, &arguments).await;
    match outcome {
        Ok(result) => {
            state.registry.touch(&key).await;
            tracing::info!(%tool, %key, "tool call ok");
            let text = serde_json::to_string_pretty(&result)
                .unwrap_or_else(|_| result.to_string());
            RpcResponse::ok(
                id,
                json!({
                    "content": [{ "type": "text", "text": text }],
                    "isError": false,
                }),
            )
        }
        Err(e) => {
            tracing::warn!(%tool, %key, kind = e.kind(), "tool call failed: {e}");
            RpcResponse::ok(
                id,
                json!({
                    "content": [{ "type": "text", "text": e.to_string() }],
                    "isError": true,
                    "errorKind": e.kind(),
                }),
            )
        }
    }
}

async fn call_on_session(
    state: &SharedState,
    key: &str,
    class: resolver::SessionClass,
    tool: &str,
    arguments: &Value,
) -> Result<Value, GatewayError> {
    let page = state.registry.get_or_create(key, class).await?;
    executor::execute(&page, tool, arguments, &state.config).await
}

async fn cleanup(state: &SharedState, arguments: &Value) -> Value {
    let result = match arguments.get("session_id").and_then(Value::as_str) {
        Some(key) => {
            let removed = state.registry.teardown_one(key).await;
            if removed {
                format!("session {key:?} closed")
            } else {
                format!("session {key:?} not found; nothing to close")
            }
        }
        None => {
            state.registry.teardown_all().await;
            "all sessions closed and browser released".to_string()
        }
    };
    json!({
        "content": [{ "type": "text", "text": result }],
        "isError": false,
    })
}
