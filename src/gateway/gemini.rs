use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{ApiKey, GatewayConfig};
use crate::forecast::Source;
use crate::gateway::{ModelProvider, ModelReply};
use crate::logging::{self, obj, v_str, Domain};

/// `generateContent` client for the Gemini REST API.
pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: ApiKey,
    temperature: f32,
    search_grounding: bool,
}

impl GeminiProvider {
    pub fn new(cfg: &GatewayConfig, api_key: ApiKey) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.upstream_timeout)
            .build()
            .context("failed to build model HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                cfg.api_base.trim_end_matches('/'),
                cfg.model
            ),
            model: cfg.model.clone(),
            api_key,
            temperature: cfg.temperature,
            search_grounding: cfg.search_grounding,
        })
    }

    fn request_body(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
            tools: if self.search_grounding {
                vec![json!({ "google_search": {} })]
            } else {
                Vec::new()
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Deserialize)]
struct WebChunk {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl GenerateResponse {
    fn into_reply(self) -> Result<ModelReply> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("model API returned no candidates"))?;

        let text: String = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        if text.trim().is_empty() {
            return Err(anyhow!("model API returned an empty response"));
        }

        let sources = candidate
            .grounding_metadata
            .map(|g| g.grounding_chunks)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|chunk| {
                let web = chunk.web?;
                Some(Source::new(web.uri?, web.title?))
            })
            .collect();

        Ok(ModelReply { text, sources })
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<ModelReply> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose())
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("model API timed out")
                } else {
                    anyhow!("model API request failed: {}", e.without_url())
                }
            })?;

        let status = resp.status();
        let body = resp.text().await.context("failed to read model API response")?;
        if !status.is_success() {
            let detail = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| "no error detail".to_string());
            logging::warn(
                Domain::Model,
                "model_http_error",
                obj(&[("status", json!(status.as_u16())), ("msg", v_str(&detail))]),
            );
            return Err(anyhow!("model API returned {}: {}", status.as_u16(), detail));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("model API response was not valid JSON")?;
        parsed.into_reply()
    }
}
