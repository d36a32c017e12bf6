//! Request lifecycle as a pure reducer.
//!
//! `Idle -> InFlight -> {Succeeded | Failed | Aborted}`. Each request gets a
//! fresh id; events carrying another id are stale and change nothing, which
//! is how a late answer from a superseded or aborted request is discarded.

use crate::client::{AbortReason, ClientError, ErrorKind};
use crate::forecast::Forecast;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestState {
    Idle,
    InFlight,
    Succeeded(Forecast),
    Failed(ClientError),
    Aborted(AbortReason),
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Succeeded(_) | RequestState::Failed(_) | RequestState::Aborted(_)
        )
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            RequestState::Failed(err) => Some(err.kind()),
            RequestState::Aborted(_) => Some(ErrorKind::Aborted),
            _ => None,
        }
    }

    /// Message to show the user, if the request ended badly.
    pub fn user_message(&self) -> Option<String> {
        match self {
            RequestState::Failed(err) => Some(err.user_message()),
            RequestState::Aborted(reason) => Some(reason.user_message().to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// Begin a new request, superseding whatever is current.
    Start { request_id: u64 },
    /// Manual retry after a failure or abort.
    Retry { request_id: u64 },
    Tick { request_id: u64, step: u8, cap: u8 },
    /// The answer arrived; show 100% before settling.
    Arrived { request_id: u64 },
    Settled { request_id: u64, forecast: Forecast },
    Failed { request_id: u64, error: ClientError },
    TimedOut { request_id: u64 },
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub request_id: u64,
    /// Synthetic progress in `[0, 100]`, for display only.
    pub progress: u8,
    pub state: RequestState,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            request_id: 0,
            progress: 0,
            state: RequestState::Idle,
        }
    }
}

impl Snapshot {
    fn is_current(&self, request_id: u64) -> bool {
        self.request_id == request_id && self.state == RequestState::InFlight
    }

    fn begin(&mut self, request_id: u64) -> Result<bool, TransitionError> {
        if request_id <= self.request_id {
            return Err(TransitionError {
                msg: format!(
                    "request id {} does not advance past {}",
                    request_id, self.request_id
                ),
            });
        }
        self.request_id = request_id;
        self.progress = 0;
        self.state = RequestState::InFlight;
        Ok(true)
    }

    /// Apply `event`. `Ok(true)` when the snapshot changed, `Ok(false)` for
    /// events that are stale or have no effect.
    pub fn apply(&mut self, event: Event) -> Result<bool, TransitionError> {
        match event {
            Event::Start { request_id } => self.begin(request_id),
            Event::Retry { request_id } => match self.state {
                RequestState::Failed(_) | RequestState::Aborted(_) => self.begin(request_id),
                _ => Err(TransitionError {
                    msg: "retry is only possible after a failure".to_string(),
                }),
            },
            Event::Tick {
                request_id,
                step,
                cap,
            } => {
                if !self.is_current(request_id) || self.progress >= cap {
                    return Ok(false);
                }
                self.progress = self.progress.saturating_add(step).min(cap);
                Ok(true)
            }
            Event::Arrived { request_id } => {
                if !self.is_current(request_id) || self.progress == 100 {
                    return Ok(false);
                }
                self.progress = 100;
                Ok(true)
            }
            Event::Settled {
                request_id,
                forecast,
            } => {
                if !self.is_current(request_id) {
                    return Ok(false);
                }
                self.progress = 100;
                self.state = RequestState::Succeeded(forecast);
                Ok(true)
            }
            Event::Failed { request_id, error } => {
                if !self.is_current(request_id) {
                    return Ok(false);
                }
                self.state = RequestState::Failed(error);
                Ok(true)
            }
            Event::TimedOut { request_id } => {
                if !self.is_current(request_id) {
                    return Ok(false);
                }
                self.state = RequestState::Aborted(AbortReason::TimedOut);
                Ok(true)
            }
            Event::Cancel => {
                if self.state != RequestState::InFlight {
                    return Ok(false);
                }
                self.state = RequestState::Aborted(AbortReason::Cancelled);
                Ok(true)
            }
        }
    }
}
