//! CDP wire types.
//!
//! Minimal set: request/response correlation plus the handful of
//! target-domain results the engine layer needs. Anything else travels
//! as raw `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request ID, monotonically increasing per connection.
pub type RequestId = u64;

/// Target ID assigned by the browser.
pub type TargetId = String;

/// Browser context ID from Target.createBrowserContext.
pub type BrowserContextId = String;

/// Session ID for attached targets.
pub type SessionId = String;

#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponse {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CdpProtocolError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CdpProtocolError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Event pushed by the browser; carries no request ID.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

/// Unified inbound message: either a response or an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CdpMessage {
    Response(CdpResponse),
    Event(CdpEvent),
}

/// Result of Target.attachToTarget.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachToTargetResult {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
}

/// Result of Target.createBrowserContext.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBrowserContextResult {
    #[serde(rename = "browserContextId")]
    pub browser_context_id: BrowserContextId,
}

/// Result of Target.createTarget.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTargetResult {
    #[serde(rename = "targetId")]
    pub target_id: TargetId,
}

/// Result of Browser.getVersion, used as the liveness probe.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserVersion {
    pub product: String,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
}
