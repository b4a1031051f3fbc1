//! Chrome DevTools Protocol plumbing.
//!
//! One WebSocket connection per browser process; page targets share it
//! through flat sessions.

pub mod client;
pub mod protocol;

pub use client::{CdpClient, CdpError, DEFAULT_CDP_TIMEOUT};
pub use protocol::{BrowserContextId, BrowserVersion, SessionId, TargetId};
