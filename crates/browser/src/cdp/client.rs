//! CDP client over a single browser-level WebSocket.
//!
//! Design:
//! 1. One WebSocket per browser process; page targets multiplex over it
//!    via the `sessionId` field (flat session mode).
//! 2. Responses are matched to callers by request ID through a DashMap
//!    of oneshot senders; no lock is held across an await on the read
//!    path.
//! 3. Every request carries a deadline. A browser that stops answering
//!    looks identical to one that died, which is exactly how the engine
//!    layer wants to see it.

use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::*;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Default deadline for a single CDP round trip. Navigation and other
/// long operations pass their own bound via `send_with_timeout`.
pub const DEFAULT_CDP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum CdpError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cdp protocol error: {code} - {message}")]
    Protocol { code: i32, message: String },

    #[error("cdp request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, CdpError>;

/// CDP client bound to one browser process.
pub struct CdpClient {
    next_id: AtomicU64,

    /// Callers parked on in-flight requests, keyed by request ID.
    pending: Arc<DashMap<RequestId, oneshot::Sender<CdpResponse>>>,

    /// Flips once the read loop exits; all later sends fail fast.
    connected: Arc<AtomicBool>,

    ws_sink: RwLock<WsSink>,
}

impl CdpClient {
    /// Connect to a browser-level DevTools WebSocket endpoint.
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (sink, mut stream) = ws_stream.split();

        let pending: Arc<DashMap<RequestId, oneshot::Sender<CdpResponse>>> =
            Arc::new(DashMap::new());
        let connected = Arc::new(AtomicBool::new(true));

        let client = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: pending.clone(),
            connected: connected.clone(),
            ws_sink: RwLock::new(sink),
        });

        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => dispatch_inbound(&pending, &text),
                    Ok(Message::Close(_)) => {
                        tracing::info!("cdp websocket closed by browser");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("cdp websocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            connected.store(false, Ordering::SeqCst);
            // Wake every parked caller with Closed instead of hanging.
            pending.clear();
        });

        Ok(client)
    }

    /// Whether the read loop is still alive. A `false` here is
    /// definitive; a `true` may still race with a disconnect, which the
    /// next send will surface.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Send a request with the default deadline.
    pub async fn send(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Result<Value> {
        self.send_with_timeout(method, params, session_id, DEFAULT_CDP_TIMEOUT)
            .await
    }

    /// Send a request and wait for its response within `timeout`.
    pub async fn send_with_timeout(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
        timeout: Duration,
    ) -> Result<Value> {
        if !self.is_connected() {
            return Err(CdpError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.into(),
            params,
            session_id,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let json = serde_json::to_string(&request)?;
        {
            let mut sink = self.ws_sink.write().await;
            if let Err(e) = sink.send(Message::Text(json)).await {
                self.pending.remove(&id);
                return Err(CdpError::WebSocket(e));
            }
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            // Sender dropped: read loop exited and cleared pending.
            Ok(Err(_)) => return Err(CdpError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                return Err(CdpError::Timeout(timeout));
            }
        };

        if let Some(error) = response.error {
            return Err(CdpError::Protocol {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Close the WebSocket. Parked callers are released by the read
    /// loop winding down.
    pub async fn close(&self) {
        let mut sink = self.ws_sink.write().await;
        if let Err(e) = sink.close().await {
            tracing::debug!("cdp close failed (already gone?): {}", e);
        }
    }
}

fn dispatch_inbound(pending: &DashMap<RequestId, oneshot::Sender<CdpResponse>>, text: &str) {
    match serde_json::from_str::<CdpMessage>(text) {
        Ok(CdpMessage::Response(response)) => {
            if let Some((_, tx)) = pending.remove(&response.id) {
                let _ = tx.send(response);
            } else {
                tracing::warn!("response for unknown request id {}", response.id);
            }
        }
        Ok(CdpMessage::Event(event)) => {
            // Page state is read by polling, not by event subscription,
            // so events are only useful for diagnostics.
            tracing::trace!(method = %event.method, "cdp event");
        }
        Err(e) => tracing::warn!("unparseable cdp message: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_response_reaches_pending_caller() {
        let pending: DashMap<RequestId, oneshot::Sender<CdpResponse>> = DashMap::new();
        let (tx, mut rx) = oneshot::channel();
        pending.insert(3, tx);

        dispatch_inbound(&pending, r#"{"id":3,"result":{"ok":true}}"#);

        let response = rx.try_recv().unwrap();
        assert_eq!(response.id, 3);
        assert!(pending.is_empty());
    }

    #[test]
    fn inbound_event_is_ignored() {
        let pending: DashMap<RequestId, oneshot::Sender<CdpResponse>> = DashMap::new();
        dispatch_inbound(&pending, r#"{"method":"Network.requestWillBeSent"}"#);
        assert!(pending.is_empty());
    }
}
