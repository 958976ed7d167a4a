//! Client for the remote watermark removal job service.
//!
//! Submits a job for an input video, polls it under a bounded policy until
//! the service reports a terminal state, and normalizes the response into a
//! [`TerminalJob`](wmr_models::TerminalJob). Every failure maps onto one
//! [`ErrorKind`] so callers render errors the same way regardless of where
//! they occurred.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod policy;
pub mod poll;
pub mod types;
pub mod validation;

pub use client::TaskClient;
pub use config::ClientConfig;
pub use error::{
    ApiError, ApiResult, ConfigError, ErrorKind, PollError, PollResult, TimeoutReason,
    TransportKind,
};
pub use normalize::normalize;
pub use poll::{poll_until_terminal, StatusSource};
pub use policy::{Backoff, PollPolicy};
pub use types::{JobHandle, StatusSnapshot, SubmitOptions};
pub use validation::{InputPolicy, InputValidator};
