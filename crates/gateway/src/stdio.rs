//! Line-delimited JSON-RPC over stdin/stdout.
//!
//! One request per line, one response per line. All diagnostics go to
//! stderr via tracing; stdout carries nothing but responses.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::rpc::{self, SharedState};

/// Serve until stdin reaches EOF.
pub async fn serve(state: SharedState) -> std::io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    tracing::info!("stdio transport ready");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(response) = rpc::handle_raw(&state, line).await {
            stdout.write_all(response.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }
    tracing::info!("stdin closed; stdio transport done");
    Ok(())
}
