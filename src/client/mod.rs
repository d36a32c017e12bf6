//! Dashboard side of the forecast request.

use async_trait::async_trait;
use thiserror::Error;

use crate::forecast::Forecast;

mod http;
pub mod lifecycle;
mod orchestrator;

pub use http::HttpGatewayClient;
pub use lifecycle::{Event, RequestState, Snapshot, TransitionError};
pub use orchestrator::Orchestrator;

pub const TIMEOUT_MESSAGE: &str =
    "The analysis request timed out. The server may be busy. Please try again in a moment.";
pub const CANCELLED_MESSAGE: &str = "The analysis request was cancelled.";

/// Closed set of failure kinds the dashboard distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Upstream,
    Validation,
    Aborted,
    MalformedServerResponse,
}

impl ErrorKind {
    /// Whether pressing retry can help. A missing credential needs an
    /// operator, not another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::Configuration)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    MalformedServerResponse(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Configuration(_) => ErrorKind::Configuration,
            ClientError::Upstream(_) => ErrorKind::Upstream,
            ClientError::Validation(_) => ErrorKind::Validation,
            ClientError::MalformedServerResponse(_) => ErrorKind::MalformedServerResponse,
        }
    }

    pub fn user_message(&self) -> String {
        format!("Analysis failed: {}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    TimedOut,
    Cancelled,
}

impl AbortReason {
    pub fn user_message(&self) -> &'static str {
        match self {
            AbortReason::TimedOut => TIMEOUT_MESSAGE,
            AbortReason::Cancelled => CANCELLED_MESSAGE,
        }
    }
}

/// Anything that can produce a forecast for the orchestrator.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch_forecast(&self) -> Result<Forecast, ClientError>;
}
