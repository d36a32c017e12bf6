use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::client::lifecycle::{Event, RequestState, Snapshot, TransitionError};
use crate::client::ForecastSource;
use crate::config::OrchestratorConfig;
use crate::logging::{self, obj, v_str, Domain};

/// Drives one forecast request at a time through the lifecycle reducer.
///
/// Each request runs in its own task that owns the call, the timeout and
/// the progress ticker; all three are dropped together on every exit path.
/// Starting a new request aborts the previous task.
pub struct Orchestrator {
    source: Arc<dyn ForecastSource>,
    cfg: OrchestratorConfig,
    state: Arc<watch::Sender<Snapshot>>,
    last_id: u64,
    task: Option<JoinHandle<()>>,
}

fn dispatch(state: &watch::Sender<Snapshot>, event: Event) -> bool {
    state.send_if_modified(|snap| match snap.apply(event) {
        Ok(changed) => changed,
        Err(err) => {
            logging::warn(
                Domain::Client,
                "transition_rejected",
                obj(&[("msg", v_str(&err.msg))]),
            );
            false
        }
    })
}

impl Orchestrator {
    pub fn new(source: Arc<dyn ForecastSource>, cfg: OrchestratorConfig) -> Self {
        let (tx, _rx) = watch::channel(Snapshot::default());
        Self {
            source,
            cfg,
            state: Arc::new(tx),
            last_id: 0,
            task: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    /// Begin a request, superseding any in flight. Returns its id.
    pub fn start(&mut self) -> u64 {
        self.stop_task();
        self.last_id += 1;
        let request_id = self.last_id;
        dispatch(&self.state, Event::Start { request_id });
        self.spawn(request_id);
        request_id
    }

    /// Re-enter `InFlight` after a failure or abort.
    pub fn retry(&mut self) -> Result<u64, TransitionError> {
        let request_id = self.last_id + 1;
        let mut rejected = None;
        self.state.send_if_modified(|snap| {
            match snap.apply(Event::Retry { request_id }) {
                Ok(changed) => changed,
                Err(err) => {
                    rejected = Some(err);
                    false
                }
            }
        });
        if let Some(err) = rejected {
            return Err(err);
        }
        self.stop_task();
        self.last_id = request_id;
        self.spawn(request_id);
        Ok(request_id)
    }

    /// Abort the in-flight request, if any.
    pub fn cancel(&mut self) {
        self.stop_task();
        if dispatch(&self.state, Event::Cancel) {
            logging::info(
                Domain::Client,
                "cancelled",
                obj(&[("request_id", json!(self.last_id))]),
            );
        }
    }

    /// Wait until the current request reaches a terminal state. Returns at
    /// once when nothing was started.
    pub async fn settled(&self) -> Snapshot {
        let mut rx = self.subscribe();
        let done = |s: &Snapshot| s.state.is_terminal() || s.state == RequestState::Idle;
        let snap = match rx.wait_for(done).await {
            Ok(snap) => snap.clone(),
            Err(_) => self.snapshot(),
        };
        snap
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn spawn(&mut self, request_id: u64) {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let cfg = self.cfg.clone();
        self.task = Some(tokio::spawn(run_request(source, cfg, state, request_id)));
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop_task();
    }
}

async fn run_request(
    source: Arc<dyn ForecastSource>,
    cfg: OrchestratorConfig,
    state: Arc<watch::Sender<Snapshot>>,
    request_id: u64,
) {
    logging::debug(
        Domain::Client,
        "request_started",
        obj(&[("request_id", json!(request_id))]),
    );

    let outcome = {
        let call = source.fetch_forecast();
        tokio::pin!(call);
        let deadline = time::sleep(cfg.timeout);
        tokio::pin!(deadline);
        let mut ticker = time::interval_at(Instant::now() + cfg.tick_every, cfg.tick_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                result = &mut call => break Some(result),
                _ = &mut deadline => break None,
                _ = ticker.tick() => {
                    dispatch(&state, Event::Tick {
                        request_id,
                        step: cfg.tick_step,
                        cap: cfg.progress_cap,
                    });
                }
            }
        }
    };

    match outcome {
        Some(Ok(forecast)) => {
            dispatch(&state, Event::Arrived { request_id });
            time::sleep(cfg.settle_delay).await;
            if dispatch(&state, Event::Settled { request_id, forecast }) {
                logging::debug(
                    Domain::Client,
                    "request_succeeded",
                    obj(&[("request_id", json!(request_id))]),
                );
            }
        }
        Some(Err(error)) => {
            logging::warn(
                Domain::Client,
                "request_failed",
                obj(&[
                    ("request_id", json!(request_id)),
                    ("kind", v_str(&format!("{:?}", error.kind()))),
                    ("msg", v_str(&error.to_string())),
                ]),
            );
            dispatch(&state, Event::Failed { request_id, error });
        }
        None => {
            logging::warn(
                Domain::Client,
                "request_timed_out",
                obj(&[
                    ("request_id", json!(request_id)),
                    ("timeout_ms", json!(cfg.timeout.as_millis() as u64)),
                ]),
            );
            dispatch(&state, Event::TimedOut { request_id });
        }
    }
}
