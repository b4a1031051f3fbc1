//! HTTP transport: the same JSON-RPC dispatch behind a POST endpoint,
//! plus a health probe.
//!
//! `GET /mcp` serves the legacy SSE handshake some clients still open
//! before switching to POST: a single `endpoint` event, then silence
//! held open by keep-alives.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use serde_json::json;

use crate::rpc::{self, SharedState};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/mcp", post(post_mcp).get(get_mcp))
        .route("/health", get(health))
        .with_state(state)
}

async fn post_mcp(State(state): State<SharedState>, body: String) -> impl IntoResponse {
    match rpc::handle_raw(&state, &body).await {
        Some(response) => (
            StatusCode::OK,
            [("content-type", "application/json")],
            response,
        )
            .into_response(),
        // Notifications owe no body.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn get_mcp() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let endpoint = stream::once(async { Ok(Event::default().event("endpoint").data("/mcp")) });
    let stream = endpoint.chain(stream::pending());
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "sessions": state.registry.session_count().await,
        "engine": state.registry.engine_state().await,
        "uptime_secs": state.started.elapsed().as_secs(),
        "rss_bytes": rss_bytes(),
    }))
}

/// Resident set size from procfs; `null` where unavailable.
fn rss_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let rss_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(rss_pages * 4096)
}
