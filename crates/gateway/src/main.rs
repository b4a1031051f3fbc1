use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use browser::ChromiumLauncher;
use gateway::config::Config;
use gateway::registry::SessionRegistry;
use gateway::rpc::GatewayState;
use gateway::{http, maintenance, stdio};

/// Browser automation gateway speaking JSON-RPC over stdio and HTTP.
#[derive(Parser, Debug)]
#[command(name = "browser-gateway", version, about)]
struct Args {
    /// Also serve HTTP on this address (e.g. 127.0.0.1:8931).
    #[arg(long)]
    http: Option<SocketAddr>,

    /// Serve HTTP only; do not read stdin.
    #[arg(long, requires = "http")]
    http_only: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Stdout belongs to the stdio transport; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Arc::new(Config::from_env());
    tracing::info!(
        max_sessions = config.max_sessions,
        headless = config.headless,
        "starting browser gateway"
    );

    let launcher = Arc::new(ChromiumLauncher::new(
        config.chromium_binary.clone(),
        config.headless,
    ));
    let registry = Arc::new(SessionRegistry::new(launcher, config.clone()));
    let state = GatewayState::new(registry, config);

    let sweeper = maintenance::spawn_sweeper(state.clone());

    let http_server = match args.http {
        Some(addr) => {
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!("failed to bind {addr}: {e}");
                    sweeper.abort();
                    maintenance::shutdown(&state).await;
                    return ExitCode::FAILURE;
                }
            };
            tracing::info!(%addr, "http transport ready");
            let router = http::router(state.clone());
            Some(tokio::spawn(async move {
                axum::serve(listener, router).await
            }))
        }
        None => None,
    };

    let exit = if args.http_only {
        // HTTP-only mode runs until SIGINT/SIGTERM.
        maintenance::shutdown_signal().await;
        ExitCode::SUCCESS
    } else {
        tokio::select! {
            result = stdio::serve(state.clone()) => match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!("stdio transport failed: {e}");
                    ExitCode::FAILURE
                }
            },
            _ = maintenance::shutdown_signal() => ExitCode::SUCCESS,
        }
    };

    sweeper.abort();
    if let Some(server) = http_server {
        server.abort();
    }
    maintenance::shutdown(&state).await;
    exit
}
