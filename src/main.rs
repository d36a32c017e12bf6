use anyhow::{Context, Result};
use serde_json::json;

use warcast::config::GatewayConfig;
use warcast::gateway::Gateway;
use warcast::logging::{self, obj, v_str, Domain};
use warcast::server;

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // no signal handler available; run until killed
        std::future::pending::<()>().await;
    }
    logging::info(Domain::System, "shutdown", obj(&[("msg", v_str("ctrl-c received"))]));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = GatewayConfig::from_env();
    cfg.validate()?;

    logging::info(
        Domain::System,
        "startup",
        obj(&[
            ("model", v_str(&cfg.model)),
            ("search_grounding", json!(cfg.search_grounding)),
            ("upstream_timeout_ms", json!(cfg.upstream_timeout.as_millis() as u64)),
            ("credential_configured", json!(cfg.api_key.is_some())),
        ]),
    );

    let gateway = Gateway::from_config(&cfg)?;
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;

    server::serve(listener, gateway, shutdown_signal()).await
}
