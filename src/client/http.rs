use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::client::{ClientError, ForecastSource};
use crate::forecast::Forecast;
use crate::server::ErrorBody;

pub const MALFORMED_DATA_MESSAGE: &str = "Received malformed analysis data from the server.";

/// Calls the gateway endpoint over HTTP.
///
/// No request timeout is set here: the orchestrator owns the deadline and
/// cancels the call by dropping it.
pub struct HttpGatewayClient {
    client: Client,
    endpoint: Url,
}

impl HttpGatewayClient {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

/// Map a non-200 gateway response to a client error. The body is parsed
/// defensively; anything unusable falls back to a message keyed on status.
pub fn classify_error_response(status: u16, body: &[u8]) -> ClientError {
    let parsed = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .filter(|b| !b.error.trim().is_empty());
    let Some(body) = parsed else {
        return ClientError::MalformedServerResponse(format!(
            "Analysis service returned an error. Status: {}",
            status
        ));
    };
    match body.kind.as_deref() {
        Some("configuration") => ClientError::Configuration(body.error),
        Some("validation") => ClientError::Validation(body.error),
        _ => ClientError::Upstream(body.error),
    }
}

/// Decode and re-check a 200 body.
pub fn decode_forecast(body: &[u8]) -> Result<Forecast, ClientError> {
    let forecast: Forecast = serde_json::from_slice(body)
        .map_err(|_| ClientError::MalformedServerResponse(MALFORMED_DATA_MESSAGE.to_string()))?;
    forecast
        .check()
        .map_err(|_| ClientError::MalformedServerResponse(MALFORMED_DATA_MESSAGE.to_string()))?;
    Ok(forecast)
}

#[async_trait]
impl ForecastSource for HttpGatewayClient {
    async fn fetch_forecast(&self) -> Result<Forecast, ClientError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| {
                ClientError::Upstream(format!(
                    "Could not connect to the analysis service: {}",
                    e.without_url()
                ))
            })?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| {
            ClientError::Upstream(format!(
                "Could not read the analysis service response: {}",
                e.without_url()
            ))
        })?;

        if status != 200 {
            return Err(classify_error_response(status, &body));
        }
        decode_forecast(&body)
    }
}
