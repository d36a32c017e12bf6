//! Forecast gateway and dashboard client.
//!
//! The gateway holds the model credential, asks the model for a forecast and
//! validates the reply. The client drives one request at a time with a
//! synthetic progress indicator, a timeout, cancellation and manual retry.

pub mod client;
pub mod config;
pub mod forecast;
pub mod gateway;
pub mod logging;
pub mod normalize;
pub mod prompt;
pub mod render;
pub mod server;
