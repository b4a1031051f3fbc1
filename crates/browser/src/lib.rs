//! Headless-browser automation layer.
//!
//! This crate owns everything that talks CDP: the wire client, the
//! engine process lifecycle, and page-level actions. Session policy
//! (keying, eviction, timeouts) lives upstream in the gateway crate and
//! reaches the browser only through the `Engine` and `Page` traits, so
//! it stays testable without a browser on the machine.

pub mod cdp;
pub mod engine;
pub mod page;

pub use cdp::{CdpClient, CdpError};
pub use engine::{ChromiumLauncher, Engine, EngineError, Launcher};
pub use page::{Page, PageError, PageProfile, Screenshot};
