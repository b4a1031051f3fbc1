//! Gateway error taxonomy.
//!
//! Every failure that can reach a caller has a machine-checkable kind.
//! Action-level failures are converted at the executor boundary; the
//! dispatch layer only ever sees this enum, never a raw engine fault.

use browser::{EngineError, PageError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Engine launch or reconnect failed. The next call retries from
    /// scratch.
    #[error("browser engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("operation timed out after {0:?}")]
    ActionTimeout(Duration),

    #[error("no element matched selector {0:?} in time")]
    ActionTargetNotFound(String),

    #[error("authentication required and login attempt failed: {0}")]
    ActionAuthenticationRequired(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable identifier reported in failure envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::EngineUnavailable(_) => "engine_unavailable",
            GatewayError::ActionTimeout(_) => "action_timeout",
            GatewayError::ActionTargetNotFound(_) => "action_target_not_found",
            GatewayError::ActionAuthenticationRequired(_) => "action_authentication_required",
            GatewayError::NavigationFailed(_) => "navigation_failed",
            GatewayError::InvalidArguments { .. } => "invalid_arguments",
            GatewayError::UnknownTool(_) => "unknown_tool",
            GatewayError::Internal(_) => "internal",
        }
    }
}

impl From<EngineError> for GatewayError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Launch(msg) => GatewayError::EngineUnavailable(msg),
            EngineError::Disconnected => {
                GatewayError::EngineUnavailable("engine disconnected".into())
            }
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl From<PageError> for GatewayError {
    fn from(e: PageError) -> Self {
        match e {
            PageError::Timeout(d) => GatewayError::ActionTimeout(d),
            PageError::TargetNotFound(selector) => GatewayError::ActionTargetNotFound(selector),
            PageError::Navigation(msg) => GatewayError::NavigationFailed(msg),
            PageError::Cdp(browser::CdpError::Closed) => {
                GatewayError::EngineUnavailable("connection closed".into())
            }
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_errors_keep_their_kind() {
        let timeout: GatewayError = PageError::Timeout(Duration::from_secs(5)).into();
        assert_eq!(timeout.kind(), "action_timeout");

        let missing: GatewayError = PageError::TargetNotFound("#nope".into()).into();
        assert_eq!(missing.kind(), "action_target_not_found");

        let closed: GatewayError = PageError::Cdp(browser::CdpError::Closed).into();
        assert_eq!(closed.kind(), "engine_unavailable");
    }
}
