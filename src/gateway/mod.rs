//! Server-side boundary between the dashboard and the generative model.
//!
//! The gateway owns the credential (through its provider), builds the
//! prompt, makes exactly one model call per request and hands the reply to
//! the normalizer. It keeps no state between requests.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::forecast::{Forecast, Source};
use crate::logging::{self, fingerprint, obj, v_num, v_str, Domain, ProfileScope};
use crate::normalize::{normalize_with_sources, ValidationError};
use crate::prompt::{build_prompt, Clock, SystemClock};

mod gemini;

pub use gemini::GeminiProvider;

/// Raw answer from the model: free text plus any grounding citations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub sources: Vec<Source>,
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<ModelReply>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("API key is not configured on the server.")]
    Configuration,

    #[error("Failed to get analysis from AI service: {0}")]
    Upstream(String),

    #[error("AI response failed validation: {0}")]
    Validation(#[from] ValidationError),
}

impl GatewayError {
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::Configuration => 500,
            GatewayError::Upstream(_) | GatewayError::Validation(_) => 502,
        }
    }

    /// Wire discriminant sent alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Configuration => "configuration",
            GatewayError::Upstream(_) => "upstream",
            GatewayError::Validation(_) => "validation",
        }
    }
}

pub struct Gateway {
    provider: Option<Arc<dyn ModelProvider>>,
    clock: Arc<dyn Clock>,
}

impl Gateway {
    /// `None` means no credential was configured; every request then fails
    /// with [`GatewayError::Configuration`].
    pub fn new(provider: Option<Arc<dyn ModelProvider>>) -> Self {
        Self {
            provider,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn from_config(cfg: &GatewayConfig) -> Result<Self> {
        let provider: Option<Arc<dyn ModelProvider>> = match &cfg.api_key {
            Some(key) => Some(Arc::new(GeminiProvider::new(cfg, key.clone())?)),
            None => {
                logging::warn(
                    Domain::System,
                    "credential_missing",
                    obj(&[("msg", v_str("API_KEY is not set; requests will fail"))]),
                );
                None
            }
        };
        Ok(Self::new(provider))
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Build today's prompt and run it.
    pub async fn forecast(&self) -> Result<Forecast, GatewayError> {
        let prompt = build_prompt(self.clock.today());
        self.generate(&prompt).await
    }

    pub async fn generate(&self, prompt: &str) -> Result<Forecast, GatewayError> {
        let provider = self.provider.as_ref().ok_or(GatewayError::Configuration)?;

        let reply = {
            let _scope = ProfileScope::with_context("model_call", &[("provider", v_str(provider.name()))]);
            logging::debug(
                Domain::Model,
                "model_call",
                obj(&[
                    ("provider", v_str(provider.name())),
                    ("prompt_sha256", v_str(&fingerprint(prompt))),
                ]),
            );
            provider.generate(prompt).await.map_err(|e| {
                let err = GatewayError::Upstream(e.to_string());
                logging::error(
                    Domain::Model,
                    "model_failed",
                    obj(&[("provider", v_str(provider.name())), ("msg", v_str(&err.to_string()))]),
                );
                err
            })?
        };

        let forecast = normalize_with_sources(&reply.text, reply.sources).map_err(|e| {
            logging::warn(
                Domain::Gateway,
                "validation_failed",
                obj(&[
                    ("msg", v_str(&e.to_string())),
                    ("reply_sha256", v_str(&fingerprint(&reply.text))),
                    ("reply_len", json!(reply.text.len())),
                ]),
            );
            GatewayError::from(e)
        })?;

        logging::info(
            Domain::Gateway,
            "forecast_ready",
            obj(&[
                ("category", v_str(forecast.timeline_category.as_str())),
                ("sources", v_num(forecast.sources.len() as f64)),
            ]),
        );
        Ok(forecast)
    }
}
