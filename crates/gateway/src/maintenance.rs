//! Periodic upkeep, detached from request traffic: idle sessions expire
//! even when no calls arrive.

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::rpc::SharedState;

/// Spawn the sweep loop. Runs until the handle is aborted or the
/// runtime shuts down.
pub fn spawn_sweeper(state: SharedState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.config.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so a sweep never
        // races startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = state.registry.sweep_idle().await;
            if removed > 0 {
                tracing::info!(removed, "idle sweep reclaimed sessions");
                state.registry.memory_hint().await;
            }
        }
    })
}

/// Orderly teardown for process exit.
pub async fn shutdown(state: &SharedState) {
    tracing::info!("shutting down; releasing sessions and engine");
    state.registry.teardown_all().await;
}

/// Resolve when the process is asked to stop: SIGINT or, on unix,
/// SIGTERM (what service managers actually send).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received"),
            _ = term.recv() => tracing::info!("termination signal received"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("interrupt received");
    }
}
