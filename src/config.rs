use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

/// Credential for the generative model. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Blank values count as absent.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Server-side settings. Only the gateway process reads these.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: Option<ApiKey>,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub search_grounding: bool,
    /// Budget for one model call. The client timeout must outlast it.
    pub upstream_timeout: Duration,
    pub bind_addr: SocketAddr,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com".to_string(),
            temperature: 0.2,
            search_grounding: true,
            upstream_timeout: Duration::from_secs(25),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_key: std::env::var("API_KEY").ok().and_then(ApiKey::new),
            model: std::env::var("GEMINI_MODEL").unwrap_or(d.model),
            api_base: std::env::var("GEMINI_API_BASE").unwrap_or(d.api_base),
            temperature: env_parse("MODEL_TEMPERATURE", d.temperature),
            search_grounding: env_parse("SEARCH_GROUNDING", d.search_grounding),
            upstream_timeout: Duration::from_secs(env_parse(
                "UPSTREAM_TIMEOUT_SECS",
                d.upstream_timeout.as_secs(),
            )),
            bind_addr: env_parse("BIND_ADDR", d.bind_addr),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.api_base)
            .with_context(|| format!("invalid GEMINI_API_BASE {:?}", self.api_base))?;
        if !matches!(base.scheme(), "http" | "https") {
            bail!("GEMINI_API_BASE must be http(s), got {}", base.scheme());
        }
        if self.model.trim().is_empty() {
            bail!("GEMINI_MODEL is empty");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            bail!("MODEL_TEMPERATURE must be within 0..=2, got {}", self.temperature);
        }
        if self.upstream_timeout.is_zero() {
            bail!("UPSTREAM_TIMEOUT_SECS must be positive");
        }
        Ok(())
    }
}

/// Dashboard-side settings: where the gateway lives and how the request
/// lifecycle is paced.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub gateway_url: Url,
    pub orchestrator: OrchestratorConfig,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let d = OrchestratorConfig::default();
        let raw_url = std::env::var("GATEWAY_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8787/api/forecast".to_string());
        let gateway_url =
            Url::parse(&raw_url).with_context(|| format!("invalid GATEWAY_URL {:?}", raw_url))?;
        Ok(Self {
            gateway_url,
            orchestrator: OrchestratorConfig {
                timeout: Duration::from_secs(env_parse("CLIENT_TIMEOUT_SECS", d.timeout.as_secs())),
                tick_every: Duration::from_millis(env_parse(
                    "PROGRESS_TICK_MS",
                    d.tick_every.as_millis() as u64,
                )),
                settle_delay: Duration::from_millis(env_parse(
                    "SETTLE_MS",
                    d.settle_delay.as_millis() as u64,
                )),
                ..d
            },
        })
    }
}

/// Pacing for one request: timeout, synthetic progress and settle delay.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub timeout: Duration,
    pub tick_every: Duration,
    pub tick_step: u8,
    /// Progress never passes this while the call is outstanding.
    pub progress_cap: u8,
    pub settle_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(28),
            tick_every: Duration::from_millis(250),
            tick_step: 1,
            progress_cap: 95,
            settle_delay: Duration::from_millis(500),
        }
    }
}

impl OrchestratorConfig {
    /// The client must wait strictly longer than the gateway's own budget so
    /// a server-side timeout reaches the user as an upstream error.
    pub fn ensure_outlasts(&self, gateway_budget: Duration) -> Result<()> {
        if self.timeout <= gateway_budget {
            return Err(anyhow!(
                "client timeout {:?} must exceed the gateway budget {:?}",
                self.timeout,
                gateway_budget
            ));
        }
        if self.progress_cap >= 100 {
            bail!("progress cap must stay below 100, got {}", self.progress_cap);
        }
        if self.tick_every.is_zero() {
            bail!("progress tick interval must be positive");
        }
        Ok(())
    }
}
