//! HTTP surface of the gateway.
//!
//! - GET|POST /api/forecast: 200 + forecast JSON, or an error body
//! - GET /health: liveness probe

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::gateway::{Gateway, GatewayError};
use crate::logging::{self, obj, v_num, v_str, Domain};

pub const FORECAST_ROUTE: &str = "/api/forecast";

/// Error body returned with every non-200 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl From<&GatewayError> for ErrorBody {
    fn from(err: &GatewayError) -> Self {
        Self {
            error: err.to_string(),
            kind: Some(err.kind().to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub credential_configured: bool,
}

pub struct ServerState {
    pub gateway: Gateway,
    requests: AtomicU64,
}

impl ServerState {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            requests: AtomicU64::new(0),
        }
    }
}

async fn forecast_handler(State(state): State<Arc<ServerState>>) -> Response {
    let request_id = state.requests.fetch_add(1, Ordering::SeqCst) + 1;
    let started = Instant::now();
    let result = state.gateway.forecast().await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(forecast) => {
            logging::info(
                Domain::Http,
                "request",
                obj(&[
                    ("request_id", json!(request_id)),
                    ("route", v_str(FORECAST_ROUTE)),
                    ("status", json!(200)),
                    ("elapsed_ms", v_num(elapsed_ms)),
                ]),
            );
            (StatusCode::OK, Json(forecast)).into_response()
        }
        Err(err) => {
            let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            logging::error(
                Domain::Http,
                "request",
                obj(&[
                    ("request_id", json!(request_id)),
                    ("route", v_str(FORECAST_ROUTE)),
                    ("status", json!(status.as_u16())),
                    ("kind", v_str(err.kind())),
                    ("msg", v_str(&err.to_string())),
                    ("elapsed_ms", v_num(elapsed_ms)),
                ]),
            );
            (status, Json(ErrorBody::from(&err))).into_response()
        }
    }
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        credential_configured: state.gateway.is_configured(),
    })
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(FORECAST_ROUTE, get(forecast_handler).post(forecast_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    gateway: Gateway,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    logging::info(
        Domain::System,
        "listening",
        obj(&[
            ("addr", v_str(&addr.map(|a| a.to_string()).unwrap_or_default())),
            ("credential_configured", json!(gateway.is_configured())),
        ]),
    );
    let app = router(Arc::new(ServerState::new(gateway)));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
