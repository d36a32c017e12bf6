//! Terminal dashboard: fetches one forecast through the gateway and renders
//! it, with a progress line while waiting and a manual retry on failure.
//!
//! Run with: cargo run --bin dashboard

use anyhow::{anyhow, Result};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use warcast::client::{HttpGatewayClient, Orchestrator, RequestState};
use warcast::config::ClientConfig;
use warcast::render::{render_error, render_forecast, render_progress};

/// Gateway budget assumed when the dashboard runs without the server's env.
const DEFAULT_GATEWAY_BUDGET: Duration = Duration::from_secs(25);

/// Answer at the retry prompt. EOF, ctrl-c (`None`) and `q` quit.
fn wants_retry(line: Option<&str>) -> bool {
    match line {
        Some(line) => !line.trim().eq_ignore_ascii_case("q"),
        None => false,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = ClientConfig::from_env()?;
    let budget = std::env::var("UPSTREAM_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_GATEWAY_BUDGET);
    cfg.orchestrator.ensure_outlasts(budget)?;

    let source = Arc::new(HttpGatewayClient::new(cfg.gateway_url.clone()));
    let mut orch = Orchestrator::new(source, cfg.orchestrator.clone());
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    orch.start();
    loop {
        let mut rx = orch.subscribe();
        loop {
            let snap = rx.borrow_and_update().clone();
            if snap.state.is_terminal() {
                break;
            }
            eprint!("\r{}", render_progress(snap.progress));
            let _ = std::io::stderr().flush();
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    orch.cancel();
                }
            }
        }
        eprintln!();

        let snap = orch.snapshot();
        match &snap.state {
            RequestState::Succeeded(forecast) => {
                print!("{}", render_forecast(forecast));
                return Ok(());
            }
            state => {
                let message = state
                    .user_message()
                    .unwrap_or_else(|| "An unknown error occurred.".to_string());
                let retryable = state.error_kind().map_or(true, |k| k.is_retryable());
                eprint!("{}", render_error(&message, retryable));
                if !retryable {
                    std::process::exit(1);
                }
                let line = tokio::select! {
                    line = stdin.next_line() => line?,
                    _ = tokio::signal::ctrl_c() => None,
                };
                if !wants_retry(line.as_deref()) {
                    std::process::exit(1);
                }
                orch.retry().map_err(|e| anyhow!(e.msg))?;
            }
        }
    }
}
