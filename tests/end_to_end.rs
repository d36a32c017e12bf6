//! End-to-end: dashboard orchestrator -> HTTP gateway -> stub model.
//!
//! Each test binds the real router on an ephemeral port and talks to it
//! through `HttpGatewayClient`, so the wire contract is exercised as well.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use warcast::client::{
    AbortReason, ClientError, HttpGatewayClient, Orchestrator, RequestState, TIMEOUT_MESSAGE,
};
use warcast::config::OrchestratorConfig;
use warcast::forecast::{Source, TimelineCategory};
use warcast::gateway::{Gateway, ModelProvider, ModelReply};
use warcast::prompt::FixedClock;
use warcast::server::{self, ErrorBody, FORECAST_ROUTE};

const PROSE_AND_FENCE: &str = "Based on analysis [1,2]. ```json
{\"timelineCategory\":\"SOON\",
 \"timelineJustification\":\"Negotiations gain momentum [1, 2].\",
 \"keyFactors\":[
  {\"title\":\"Talks [3]\",\"impact\":\"Drafts circulate.\",\"trend\":\"NEUTRAL\"},
  {\"title\":\"Aid\",\"impact\":\"Deliveries slow [4].\",\"trend\":\"NEGATIVE_FOR_UKRAINE\"},
  {\"title\":\"Economy\",\"impact\":\"Budget strain in Moscow.\",\"trend\":\"POSITIVE_FOR_UKRAINE\"},
  {\"title\":\"Front\",\"impact\":\"Lines barely move.\",\"trend\":\"NEUTRAL\"}],
 \"outcomeProbabilities\":{\"ukraineWin\":15,\"frozenConflict\":60,\"russiaWin\":25}}
```";

enum Behaviour {
    Reply(&'static str),
    Fail(&'static str),
    Stall(Duration),
}

struct StubModel {
    behaviour: Behaviour,
    calls: AtomicU32,
}

impl StubModel {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ModelProvider for StubModel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, _prompt: &str) -> Result<ModelReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Reply(text) => Ok(ModelReply {
                text: text.to_string(),
                sources: vec![
                    Source::new("https://news.example/1", "Wire report"),
                    Source::new("https://news.example/1", "Wire report (dup)"),
                ],
            }),
            Behaviour::Fail(msg) => Err(anyhow!(*msg)),
            Behaviour::Stall(d) => {
                tokio::time::sleep(*d).await;
                Err(anyhow!("stalled"))
            }
        }
    }
}

async fn spawn_gateway(gateway: Gateway) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, gateway, std::future::pending()));
    Url::parse(&format!("http://{}{}", addr, FORECAST_ROUTE)).unwrap()
}

fn gateway_with(model: Arc<StubModel>) -> Gateway {
    let date = NaiveDate::from_ymd_opt(2025, 5, 9).unwrap();
    Gateway::new(Some(model as Arc<dyn ModelProvider>)).with_clock(Arc::new(FixedClock(date)))
}

fn fast_config(timeout: Duration) -> OrchestratorConfig {
    OrchestratorConfig {
        timeout,
        tick_every: Duration::from_millis(20),
        settle_delay: Duration::from_millis(10),
        ..Default::default()
    }
}

#[tokio::test]
async fn fenced_reply_with_prose_reaches_presentation_clean() {
    let model = StubModel::new(Behaviour::Reply(PROSE_AND_FENCE));
    let url = spawn_gateway(gateway_with(model.clone())).await;

    let mut orch = Orchestrator::new(
        Arc::new(HttpGatewayClient::new(url.clone())),
        fast_config(Duration::from_secs(10)),
    );
    assert_eq!(orch.snapshot().state, RequestState::Idle);
    orch.start();
    assert_eq!(orch.snapshot().state, RequestState::InFlight);

    let done = orch.settled().await;
    assert_eq!(done.progress, 100);
    let forecast = match done.state {
        RequestState::Succeeded(forecast) => forecast,
        other => panic!("expected success, got {:?}", other),
    };
    assert_eq!(forecast.timeline_category, TimelineCategory::Soon);
    assert_eq!(forecast.timeline_justification, "Negotiations gain momentum.");
    assert_eq!(forecast.key_factors[0].title, "Talks");
    assert_eq!(forecast.key_factors[1].impact, "Deliveries slow.");
    assert_eq!(
        forecast.sources,
        vec![Source::new("https://news.example/1", "Wire report")]
    );
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);

    let raw: serde_json::Value = reqwest::get(url).await.unwrap().json().await.unwrap();
    assert_eq!(raw["outcomeProbabilities"]["ukraineWin"].as_u64(), Some(15));
    assert_eq!(raw["outcomeProbabilities"]["frozenConflict"].as_u64(), Some(60));
}

#[tokio::test]
async fn slow_gateway_times_out_with_timeout_message() {
    let model = StubModel::new(Behaviour::Stall(Duration::from_secs(5)));
    let url = spawn_gateway(gateway_with(model)).await;

    let mut orch = Orchestrator::new(
        Arc::new(HttpGatewayClient::new(url)),
        fast_config(Duration::from_millis(300)),
    );
    orch.start();
    let done = orch.settled().await;
    assert_eq!(done.state, RequestState::Aborted(AbortReason::TimedOut));
    assert_eq!(done.state.user_message().as_deref(), Some(TIMEOUT_MESSAGE));
    assert!(done.progress < 100);
}

#[tokio::test]
async fn missing_credential_is_a_500_configuration_error() {
    let url = spawn_gateway(Gateway::new(None)).await;

    let resp = reqwest::Client::new().post(url.clone()).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 500);
    let body: ErrorBody = resp.json().await.unwrap();
    assert_eq!(body.error, "API key is not configured on the server.");
    assert_eq!(body.kind.as_deref(), Some("configuration"));

    let mut orch = Orchestrator::new(
        Arc::new(HttpGatewayClient::new(url)),
        fast_config(Duration::from_secs(5)),
    );
    orch.start();
    let done = orch.settled().await;
    match done.state {
        RequestState::Failed(err @ ClientError::Configuration(_)) => {
            assert!(!err.kind().is_retryable());
        }
        other => panic!("expected configuration failure, got {:?}", other),
    }
}

#[tokio::test]
async fn upstream_failure_is_retryable_and_not_leaked_raw() {
    let model = StubModel::new(Behaviour::Fail("quota exceeded"));
    let url = spawn_gateway(gateway_with(model.clone())).await;

    let resp = reqwest::Client::new().get(url.clone()).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 502);
    let body: ErrorBody = resp.json().await.unwrap();
    assert_eq!(body.kind.as_deref(), Some("upstream"));

    let mut orch = Orchestrator::new(
        Arc::new(HttpGatewayClient::new(url)),
        fast_config(Duration::from_secs(5)),
    );
    orch.start();
    let done = orch.settled().await;
    assert_eq!(
        done.state.user_message().as_deref(),
        Some("Analysis failed: Failed to get analysis from AI service: quota exceeded")
    );

    orch.retry().unwrap();
    let again = orch.settled().await;
    assert!(matches!(again.state, RequestState::Failed(ClientError::Upstream(_))));
    assert_eq!(again.request_id, 2);
    assert_eq!(model.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn invalid_model_output_is_a_validation_failure() {
    let model = StubModel::new(Behaviour::Reply(
        r#"{"timelineCategory":"SOON","timelineJustification":"x","keyFactors":[],"outcomeProbabilities":{"ukraineWin":1,"frozenConflict":1,"russiaWin":1}}"#,
    ));
    let url = spawn_gateway(gateway_with(model)).await;

    let mut orch = Orchestrator::new(
        Arc::new(HttpGatewayClient::new(url)),
        fast_config(Duration::from_secs(5)),
    );
    orch.start();
    let done = orch.settled().await;
    match done.state {
        RequestState::Failed(ClientError::Validation(msg)) => {
            assert!(msg.contains("keyFactors"));
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_gateway_is_an_upstream_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let url = Url::parse(&format!("http://{}{}", addr, FORECAST_ROUTE)).unwrap();

    let mut orch = Orchestrator::new(
        Arc::new(HttpGatewayClient::new(url)),
        fast_config(Duration::from_secs(5)),
    );
    orch.start();
    let done = orch.settled().await;
    match done.state {
        RequestState::Failed(ClientError::Upstream(msg)) => {
            assert!(msg.starts_with("Could not connect to the analysis service"));
        }
        other => panic!("expected upstream failure, got {:?}", other),
    }
}

#[tokio::test]
async fn health_reports_credential_presence_and_wrong_method_is_405() {
    let url = spawn_gateway(Gateway::new(None)).await;
    let client = reqwest::Client::new();

    let health = url.join("/health").unwrap();
    let body: serde_json::Value = client.get(health).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["credentialConfigured"], false);

    let resp = client.put(url).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 405);
}
